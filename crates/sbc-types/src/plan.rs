use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use sbc_wire::IndexWidth;

use crate::category::ValueCategory;
use crate::error::TypeError;
use crate::reflect::{
  BoxedValue, EnumInfo, Factory, MapInfo, MemberAccess, MemberInfo, NullableInfo, ResolveRuntime,
  ScalarInfo, SequenceInfo, TypeHandle, TypeInfo, TypeKind, Upcast,
};
use crate::resolver::PlanResolver;

/// Member name of a map entry's key in name mode.
pub const ENTRY_KEY_NAME: &str = "Key";
/// Member name of a map entry's value in name mode.
pub const ENTRY_VALUE_NAME: &str = "Value";
/// Wire index of a map entry's key.
pub const ENTRY_KEY_INDEX: u16 = 1;
/// Wire index of a map entry's value.
pub const ENTRY_VALUE_INDEX: u16 = 2;

/// Where a value sits, which decides its framing.
///
/// ```text
/// ┌─────────┬────────────────────────┬──────────────────────────────┐
/// │ Slot    │ Runtime type name      │ Presence flag                │
/// ├─────────┼────────────────────────┼──────────────────────────────┤
/// │ Root    │ always                 │ nullable composite / scalar  │
/// │ Member  │ always                 │ never (null members omitted) │
/// │ Element │ composite elements     │ composite, nullable scalar   │
/// └─────────┴────────────────────────┴──────────────────────────────┘
/// ```
///
/// Runtime type names are only written when the codec includes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
  Root,
  Member,
  Element,
}

/// How to encode and decode one type under one configuration.
///
/// Built once per (type, index width, annotation policy) and shared
/// through the [`PlanResolver`]. Nested plans are resolved on first use
/// and memoized inside the owning plan.
pub struct TypePlan {
  name: Cow<'static, str>,
  type_id: TypeId,
  category: ValueCategory,
  shape: PlanShape,
  upcasts: Vec<Upcast>,
}

pub enum PlanShape {
  Scalar(ScalarInfo),
  Enumeration(EnumInfo),
  RuntimeTypeRef,
  Sequence {
    info: SequenceInfo,
    element: LazyPlan,
  },
  KeyedMap {
    info: MapInfo,
    key: LazyPlan,
    value: LazyPlan,
  },
  Composite {
    members: MemberTable,
    /// `None` for abstract bases.
    factory: Option<Factory>,
    /// Present on polymorphic bases.
    runtime: Option<Arc<dyn ResolveRuntime>>,
  },
  Nullable {
    info: NullableInfo,
    inner: LazyPlan,
  },
}

impl TypePlan {
  pub(crate) fn build(info: TypeInfo, width: IndexWidth, ignore: bool) -> Result<Self, TypeError> {
    let TypeInfo {
      name,
      type_id,
      kind,
      upcasts,
    } = info;
    let lazy = |handle| LazyPlan::new(handle, width, ignore);

    let category = match &kind {
      TypeKind::Nullable(nullable) => {
        let inner = nullable.inner.describe();
        inner
          .kind
          .nullable_category()
          .ok_or_else(|| TypeError::NestedNullable {
            type_name: name.to_string(),
          })?
      }
      other => other
        .base_category()
        .unwrap_or(ValueCategory::Composite),
    };

    let shape = match kind {
      TypeKind::Scalar(info) => PlanShape::Scalar(info),
      TypeKind::Enumeration(info) => PlanShape::Enumeration(info),
      TypeKind::RuntimeTypeRef => PlanShape::RuntimeTypeRef,
      TypeKind::Sequence(info) => PlanShape::Sequence {
        element: lazy(info.element),
        info,
      },
      TypeKind::KeyedMap(info) => PlanShape::KeyedMap {
        key: lazy(info.key),
        value: lazy(info.value),
        info,
      },
      TypeKind::Composite(info) => PlanShape::Composite {
        members: MemberTable::build(&name, info.members, width, ignore)?,
        factory: info.factory,
        runtime: info.runtime,
      },
      TypeKind::Nullable(info) => PlanShape::Nullable {
        inner: lazy(info.inner),
        info,
      },
    };

    Ok(Self {
      name,
      type_id,
      category,
      shape,
      upcasts,
    })
  }

  /// Wire name of the type.
  #[must_use]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[must_use]
  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  /// Category used for dispatch. For `Option<T>` this is derived from
  /// `T` (see [`TypeKind::nullable_category`]).
  #[must_use]
  pub fn category(&self) -> ValueCategory {
    self.category
  }

  #[must_use]
  pub fn shape(&self) -> &PlanShape {
    &self.shape
  }

  #[must_use]
  pub fn is_nullable(&self) -> bool {
    matches!(self.shape, PlanShape::Nullable { .. })
  }

  /// Member table of a composite.
  #[must_use]
  pub fn members(&self) -> Option<&MemberTable> {
    match &self.shape {
      PlanShape::Composite { members, .. } => Some(members),
      _ => None,
    }
  }

  /// Fresh default instance, or `None` for types without a factory.
  #[must_use]
  pub fn instantiate(&self) -> Option<BoxedValue> {
    match &self.shape {
      PlanShape::Composite { factory, .. } => factory.as_ref().map(|factory| factory()),
      _ => None,
    }
  }

  /// Conversion of this type's values into `target`, if declared.
  #[must_use]
  pub fn upcast_to(&self, target: TypeId) -> Option<&Upcast> {
    self.upcasts.iter().find(|upcast| upcast.target == target)
  }

  /// Whether a value of this type may be used where `target` is expected.
  #[must_use]
  pub fn is_convertible_to(&self, target: TypeId) -> bool {
    self.type_id == target || self.upcast_to(target).is_some()
  }

  /// Whether a value in `slot` carries a one-byte presence flag.
  #[must_use]
  pub fn writes_presence(&self, slot: Slot) -> bool {
    let flagged = matches!(
      self.category,
      ValueCategory::Composite | ValueCategory::NullableScalar | ValueCategory::Enumeration
    );
    match slot {
      Slot::Member => false,
      Slot::Root => flagged && self.is_nullable(),
      Slot::Element => {
        self.category == ValueCategory::Composite || (flagged && self.is_nullable())
      }
    }
  }

  /// Whether a value in `slot` is prefixed with its runtime type name
  /// when the codec includes runtime types.
  #[must_use]
  pub fn writes_type_name(&self, slot: Slot, include_runtime_types: bool) -> bool {
    include_runtime_types
      && match slot {
        Slot::Root | Slot::Member => true,
        Slot::Element => self.category == ValueCategory::Composite,
      }
  }
}

impl fmt::Debug for TypePlan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut debug = f.debug_struct("TypePlan");
    debug
      .field("name", &self.name)
      .field("category", &self.category);
    if let Some(members) = self.members() {
      debug.field("members", &members.len());
    }
    debug.finish_non_exhaustive()
  }
}

/// A nested plan resolved on first access.
pub struct LazyPlan {
  handle: TypeHandle,
  width: IndexWidth,
  ignore: bool,
  cell: OnceLock<Arc<TypePlan>>,
}

impl LazyPlan {
  fn new(handle: TypeHandle, width: IndexWidth, ignore: bool) -> Self {
    Self {
      handle,
      width,
      ignore,
      cell: OnceLock::new(),
    }
  }

  #[must_use]
  pub fn handle(&self) -> TypeHandle {
    self.handle
  }

  /// Resolve through `resolver` once, then return the memoized plan.
  ///
  /// # Errors
  ///
  /// Any configuration error from building the nested plan.
  pub fn get(&self, resolver: &PlanResolver) -> Result<&Arc<TypePlan>, TypeError> {
    if let Some(plan) = self.cell.get() {
      return Ok(plan);
    }
    let plan = resolver.resolve_handle(self.handle, self.width, self.ignore)?;
    Ok(self.cell.get_or_init(|| plan))
  }
}

/// One encodable member of a composite.
pub struct MemberPlan {
  pub name: Cow<'static, str>,
  /// Index on the wire, already offset by +1.
  pub wire_index: u16,
  pub access: Arc<dyn MemberAccess>,
  pub plan: LazyPlan,
}

/// Members of a composite in wire order, with lookups by index and name.
pub struct MemberTable {
  members: Vec<MemberPlan>,
  by_index: HashMap<u16, usize>,
  by_name: HashMap<Cow<'static, str>, usize>,
}

impl MemberTable {
  /// Assign wire indices and validate them against `width`.
  ///
  /// If any eligible member is annotated (and annotations are honored),
  /// only annotated members are kept and each annotation `n` becomes
  /// wire index `n + 1`. Otherwise members are numbered by declaration
  /// order starting at 1.
  fn build(
    type_name: &str,
    declared: Vec<MemberInfo>,
    width: IndexWidth,
    ignore_annotations: bool,
  ) -> Result<Self, TypeError> {
    let max = width.max_wire_index();
    let eligible: Vec<MemberInfo> = declared.into_iter().filter(|m| !m.ignored).collect();
    let annotated = !ignore_annotations && eligible.iter().any(|m| m.index.is_some());

    let mut numbered = Vec::with_capacity(eligible.len());
    if annotated {
      for member in eligible {
        let Some(index) = member.index else {
          continue;
        };
        let wire_index = index
          .checked_add(1)
          .filter(|wire| *wire <= max)
          .ok_or_else(|| TypeError::IndexOutOfRange {
            type_name: type_name.to_owned(),
            member: member.name.to_string(),
            index,
            max: max - 1,
          })?;
        numbered.push((wire_index, member));
      }
    } else {
      if eligible.len() > usize::from(max) {
        return Err(TypeError::TooManyMembers {
          type_name: type_name.to_owned(),
          count: eligible.len(),
          max,
        });
      }
      for (wire_index, member) in (1..=max).zip(eligible) {
        numbered.push((wire_index, member));
      }
    }
    numbered.sort_by_key(|(wire_index, _)| *wire_index);

    let mut table = Self {
      members: Vec::with_capacity(numbered.len()),
      by_index: HashMap::with_capacity(numbered.len()),
      by_name: HashMap::with_capacity(numbered.len()),
    };
    for (position, (wire_index, member)) in numbered.into_iter().enumerate() {
      if table.by_index.insert(wire_index, position).is_some() {
        return Err(TypeError::DuplicateIndex {
          type_name: type_name.to_owned(),
          index: wire_index,
        });
      }
      if table.by_name.insert(member.name.clone(), position).is_some() {
        return Err(TypeError::DuplicateName {
          type_name: type_name.to_owned(),
          member: member.name.into_owned(),
        });
      }
      table.members.push(MemberPlan {
        name: member.name,
        wire_index,
        access: member.access,
        plan: LazyPlan::new(member.handle, width, ignore_annotations),
      });
    }
    Ok(table)
  }

  pub fn iter(&self) -> impl Iterator<Item = &MemberPlan> {
    self.members.iter()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.members.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }

  #[must_use]
  pub fn by_index(&self, wire_index: u16) -> Option<&MemberPlan> {
    self.by_index.get(&wire_index).map(|&i| &self.members[i])
  }

  #[must_use]
  pub fn by_name(&self, name: &str) -> Option<&MemberPlan> {
    self.by_name.get(name).map(|&i| &self.members[i])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reflect::Reflect;

  #[derive(Default)]
  struct Sparse {
    a: i32,
    b: i32,
    c: i32,
  }

  impl Reflect for Sparse {
    fn describe() -> TypeInfo {
      TypeInfo::composite::<Self>("test.Sparse")
        .member("A", |s| &s.a, |s, v| s.a = v)
        .index(9)
        .member("B", |s| &s.b, |s, v| s.b = v)
        .member("C", |s| &s.c, |s, v| s.c = v)
        .index(2)
        .build()
    }
  }

  fn build<T: Reflect>(width: IndexWidth, ignore: bool) -> Result<TypePlan, TypeError> {
    TypePlan::build(T::describe(), width, ignore)
  }

  #[test]
  fn annotated_members_are_used_exclusively() {
    let plan = build::<Sparse>(IndexWidth::One, false).unwrap();
    let members = plan.members().unwrap();
    let order: Vec<(&str, u16)> = members.iter().map(|m| (&*m.name, m.wire_index)).collect();
    assert_eq!(order, [("C", 3), ("A", 10)]);
    assert!(members.by_name("B").is_none());
  }

  #[test]
  fn ignoring_annotations_numbers_by_declaration() {
    let plan = build::<Sparse>(IndexWidth::One, true).unwrap();
    let members = plan.members().unwrap();
    assert_eq!(members.by_index(2).unwrap().name, "B");
    assert_eq!(members.len(), 3);
  }

  #[test]
  fn nullable_categories() {
    let text = build::<Option<String>>(IndexWidth::One, false).unwrap();
    assert_eq!(text.category(), ValueCategory::Scalar);
    let number = build::<Option<i32>>(IndexWidth::One, false).unwrap();
    assert_eq!(number.category(), ValueCategory::NullableScalar);
    let nested = build::<Option<Option<i32>>>(IndexWidth::One, false).unwrap_err();
    assert!(matches!(nested, TypeError::NestedNullable { .. }));
  }

  #[test]
  fn framing_rules() {
    let composite = build::<Sparse>(IndexWidth::One, false).unwrap();
    assert!(!composite.writes_presence(Slot::Root));
    assert!(composite.writes_presence(Slot::Element));
    assert!(!composite.writes_presence(Slot::Member));

    let maybe = build::<Option<Sparse>>(IndexWidth::One, false).unwrap();
    assert!(maybe.writes_presence(Slot::Root));

    let plain = build::<i32>(IndexWidth::One, false).unwrap();
    assert!(!plain.writes_presence(Slot::Element));
    assert!(!plain.writes_type_name(Slot::Element, true));
    assert!(plain.writes_type_name(Slot::Member, true));
    assert!(!plain.writes_type_name(Slot::Root, false));
  }
}
