//! Decisions common to the buffered decoder and the frame engine.
//!
//! Both decode paths read the same framing in the same order. Everything
//! that does not depend on *how* bytes are obtained lives here.

use std::sync::Arc;

use sbc_types::plan::{ENTRY_KEY_INDEX, ENTRY_KEY_NAME, ENTRY_VALUE_INDEX, ENTRY_VALUE_NAME};
use sbc_types::reflect::Upcast;
use sbc_types::{BoxedValue, CodecOptions, MemberPlan, MemberTable, PlanResolver, PlanShape, TypePlan};
use sbc_wire::END_OF_OBJECT;
use tracing::warn;

use crate::error::DecodeError;

/// Concrete plan chosen for a value, and the conversion back to the
/// expected type when they differ.
pub(crate) struct Selection {
    pub plan: Arc<TypePlan>,
    pub upcast: Option<Upcast>,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("plan", &self.plan)
            .field("upcast", &self.upcast.as_ref().map(|u| u.target))
            .finish()
    }
}

impl Selection {
    pub fn keep(expected: &Arc<TypePlan>) -> Self {
        Self {
            plan: Arc::clone(expected),
            upcast: None,
        }
    }
}

/// Choose the plan for an encoded runtime type name.
///
/// ```text
/// name                         outcome
/// ───────────────────────────  ──────────────────────────────────
/// null, empty, or expected     expected plan
/// not registered               expected plan (warn)
/// registered, convertible      that plan, upcast on completion
/// registered, not convertible  SchemaMismatch
/// ```
pub(crate) fn select_runtime_plan(
    resolver: &PlanResolver,
    options: &CodecOptions,
    expected: &Arc<TypePlan>,
    name: Option<&str>,
) -> Result<Selection, DecodeError> {
    let Some(name) = name.filter(|name| !name.is_empty() && *name != expected.name()) else {
        return Ok(Selection::keep(expected));
    };
    let Some(found) = resolver.resolve_name(name, options.index_width, options.ignore_index_annotations)
    else {
        warn!(type_name = name, expected = expected.name(), "unknown runtime type, decoding as expected type");
        return Ok(Selection::keep(expected));
    };
    let found = found?;
    if found.type_id() == expected.type_id() {
        return Ok(Selection::keep(expected));
    }
    match found.upcast_to(expected.type_id()).cloned() {
        Some(upcast) => Ok(Selection {
            plan: found,
            upcast: Some(upcast),
        }),
        None => Err(DecodeError::SchemaMismatch {
            expected: expected.name().to_owned(),
            found: name.to_owned(),
        }),
    }
}

/// The plan a nullable wraps, or `declared` itself.
pub(crate) fn unwrap_nullable(
    resolver: &PlanResolver,
    declared: &Arc<TypePlan>,
) -> Result<Arc<TypePlan>, DecodeError> {
    match declared.shape() {
        PlanShape::Nullable { inner, .. } => Ok(Arc::clone(inner.get(resolver)?)),
        _ => Ok(Arc::clone(declared)),
    }
}

/// Value for a null marker read in a `declared` position.
pub(crate) fn null_value(declared: &TypePlan) -> Result<BoxedValue, DecodeError> {
    match declared.shape() {
        PlanShape::Nullable { info, .. } => Ok((info.wrap)(None)?),
        _ => Err(DecodeError::UnexpectedNull {
            type_name: declared.name().to_owned(),
        }),
    }
}

/// Convert a decoded concrete value into what the `declared` slot holds.
pub(crate) fn finish(
    declared: &TypePlan,
    upcast: Option<&Upcast>,
    value: BoxedValue,
) -> Result<BoxedValue, DecodeError> {
    let value = match upcast {
        Some(upcast) => upcast.apply(value)?,
        None => value,
    };
    match declared.shape() {
        PlanShape::Nullable { info, .. } => Ok((info.wrap)(Some(value))?),
        _ => Ok(value),
    }
}

pub(crate) fn presence_flag(byte: u8) -> Result<bool, DecodeError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::MalformedSentinel {
            marker: "presence flag",
            found: format!("{other:#04x}"),
        }),
    }
}

/// A map entry must be present; entries have no null form.
pub(crate) fn entry_flag(byte: u8) -> Result<(), DecodeError> {
    if byte == 1 {
        Ok(())
    } else {
        Err(DecodeError::MalformedSentinel {
            marker: "map entry flag",
            found: format!("{byte:#04x}"),
        })
    }
}

/// Capacity to reserve for a container whose input claims `count` items.
pub(crate) fn capacity(options: &CodecOptions, count: usize) -> usize {
    count.min(options.max_preallocation)
}

// ── Member keys ─────────────────────────────────────────────────────

pub(crate) enum MemberKey<'p> {
    End,
    Known(&'p MemberPlan),
    /// Label for diagnostics: the member name, or `#index`.
    Unknown(String),
}

pub(crate) fn member_by_index(members: &MemberTable, index: u16) -> MemberKey<'_> {
    if index == END_OF_OBJECT {
        return MemberKey::End;
    }
    members
        .by_index(index)
        .map_or_else(|| MemberKey::Unknown(format!("#{index}")), MemberKey::Known)
}

/// A null name never appears in well-formed input.
pub(crate) fn member_by_name<'p>(
    members: &'p MemberTable,
    name: Option<&str>,
) -> Result<MemberKey<'p>, DecodeError> {
    match name {
        None => Err(null_member_name()),
        Some("") => Ok(MemberKey::End),
        Some(name) => Ok(members
            .by_name(name)
            .map_or_else(|| MemberKey::Unknown(name.to_owned()), MemberKey::Known)),
    }
}

pub(crate) fn null_member_name() -> DecodeError {
    DecodeError::MalformedSentinel {
        marker: "member name",
        found: "null".to_owned(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EntryPart {
    End,
    Key,
    Value,
}

pub(crate) fn entry_part_by_index(index: u16) -> Result<EntryPart, DecodeError> {
    match index {
        END_OF_OBJECT => Ok(EntryPart::End),
        ENTRY_KEY_INDEX => Ok(EntryPart::Key),
        ENTRY_VALUE_INDEX => Ok(EntryPart::Value),
        other => Err(DecodeError::MalformedSentinel {
            marker: "map entry member",
            found: format!("#{other}"),
        }),
    }
}

pub(crate) fn entry_part_by_name(name: Option<&str>) -> Result<EntryPart, DecodeError> {
    match name {
        None => Err(null_member_name()),
        Some("") => Ok(EntryPart::End),
        Some(ENTRY_KEY_NAME) => Ok(EntryPart::Key),
        Some(ENTRY_VALUE_NAME) => Ok(EntryPart::Value),
        Some(other) => Err(DecodeError::MalformedSentinel {
            marker: "map entry member",
            found: format!("{other:?}"),
        }),
    }
}

/// Complete a map entry whose members have all been read. An omitted
/// part was null on the wire.
pub(crate) fn entry_parts(
    key_plan: &TypePlan,
    value_plan: &TypePlan,
    key: Option<BoxedValue>,
    value: Option<BoxedValue>,
) -> Result<(BoxedValue, BoxedValue), DecodeError> {
    let key = match key {
        Some(key) => key,
        None => null_value(key_plan)?,
    };
    let value = match value {
        Some(value) => value,
        None => null_value(value_plan)?,
    };
    Ok((key, value))
}

pub(crate) fn undrainable(owner: &TypePlan, member: String) -> DecodeError {
    DecodeError::UndrainableMember {
        type_name: owner.name().to_owned(),
        member,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_flag_rejects_other_bytes() {
        assert!(!presence_flag(0).unwrap());
        assert!(presence_flag(1).unwrap());
        let err = presence_flag(2).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedSentinel { marker: "presence flag", .. }));
    }

    #[test]
    fn entry_parts_by_name_and_index() {
        assert_eq!(entry_part_by_index(0).unwrap(), EntryPart::End);
        assert_eq!(entry_part_by_index(2).unwrap(), EntryPart::Value);
        assert!(entry_part_by_index(3).is_err());
        assert_eq!(entry_part_by_name(Some("Key")).unwrap(), EntryPart::Key);
        assert!(entry_part_by_name(None).is_err());
    }

    #[test]
    fn null_for_nullable_and_not() {
        let resolver = PlanResolver::new();
        let options = CodecOptions::default();
        let nullable = resolver.resolve::<Option<u8>>(&options).unwrap();
        let value = null_value(&nullable).unwrap();
        assert_eq!(*value.downcast::<Option<u8>>().unwrap(), None);

        let plain = resolver.resolve::<u8>(&options).unwrap();
        assert!(matches!(null_value(&plain), Err(DecodeError::UnexpectedNull { .. })));
    }

    #[test]
    fn unknown_runtime_name_keeps_expected() {
        let resolver = PlanResolver::new();
        let options = CodecOptions::default();
        let expected = resolver.resolve::<i32>(&options).unwrap();
        let selection = select_runtime_plan(&resolver, &options, &expected, Some("nope.Missing")).unwrap();
        assert!(Arc::ptr_eq(&selection.plan, &expected));
        assert!(selection.upcast.is_none());
    }

    #[test]
    fn unrelated_runtime_name_is_a_mismatch() {
        let resolver = PlanResolver::new();
        let options = CodecOptions::default();
        let expected = resolver.resolve::<i32>(&options).unwrap();
        let err = select_runtime_plan(&resolver, &options, &expected, Some("i64")).unwrap_err();
        assert!(matches!(err, DecodeError::SchemaMismatch { .. }));
    }

    #[test]
    fn preallocation_is_capped() {
        let options = CodecOptions::default().with_max_preallocation(16);
        assert_eq!(capacity(&options, 3), 3);
        assert_eq!(capacity(&options, 1 << 30), 16);
    }
}
