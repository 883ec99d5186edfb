use std::any::Any;
use std::io::Write;
use std::sync::Arc;

use sbc_types::plan::{ENTRY_KEY_INDEX, ENTRY_KEY_NAME, ENTRY_VALUE_INDEX, ENTRY_VALUE_NAME};
use sbc_types::{CodecOptions, PlanResolver, PlanShape, Reflect, Slot, TypeError, TypePlan, TypeRef};
use sbc_wire::ScalarKind;
use tracing::trace;

use crate::error::EncodeError;
use crate::value_writer::ValueWriter;

/// Binary encoder: turns a live object graph into bytes.
///
/// The encoder is stateless across calls. It holds the codec options and
/// a shared [`PlanResolver`]; hand the same resolver to the decoder so
/// both sides agree on plans and runtime type names.
///
/// # Usage
///
/// ```rust
/// use sbc_encoder::Encoder;
/// use sbc_types::CodecOptions;
///
/// let encoder = Encoder::new(CodecOptions::default());
/// let bytes = encoder.encode(&vec![String::from("a"), String::from("b")]).unwrap();
/// assert_eq!(bytes[..4], [0x02, 0x00, 0x00, 0x00]);
/// ```
///
/// # Output layout
///
/// A root value is written as:
///
/// ```text
/// ┌──────────────────────┬────────────────────────────────────────┐
/// │ [type name]          │ runtime-type mode only                 │
/// │ [presence flag]      │ nullable composites / scalars only     │
/// │ body                 │ per category (see ValueCategory)       │
/// └──────────────────────┴────────────────────────────────────────┘
/// ```
///
/// Composite bodies list every non-null member as `{key}{value}` in wire
/// index order and end with the sentinel. Members are framed the same
/// way with `Slot::Member` rules, so a null member costs zero bytes.
///
/// Cyclic graphs are not detected; encoding one does not terminate.
pub struct Encoder {
    resolver: Arc<PlanResolver>,
    options: CodecOptions,
}

impl Encoder {
    /// Create an encoder with its own resolver.
    #[must_use]
    pub fn new(options: CodecOptions) -> Self {
        Self::with_resolver(Arc::new(PlanResolver::new()), options)
    }

    /// Create an encoder sharing an existing resolver.
    #[must_use]
    pub fn with_resolver(resolver: Arc<PlanResolver>, options: CodecOptions) -> Self {
        Self { resolver, options }
    }

    #[must_use]
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<PlanResolver> {
        &self.resolver
    }

    /// Encode `value` into a new buffer.
    ///
    /// # Errors
    ///
    /// Any [`EncodeError`]; configuration errors surface on first use of
    /// a type.
    pub fn encode<T: Reflect>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.encode_into(value, &mut buf)?;
        Ok(buf)
    }

    /// Append the encoding of `value` to `buf`.
    ///
    /// # Errors
    ///
    /// See [`encode`](Self::encode). On error `buf` may hold a partial
    /// encoding.
    pub fn encode_into<T: Reflect>(&self, value: &T, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let plan = self.resolver.resolve::<T>(&self.options)?;
        self.encode_value(value, &plan, buf)
    }

    /// Append the encoding of a type-erased root value.
    ///
    /// # Errors
    ///
    /// See [`encode`](Self::encode). [`TypeError::TypeMismatch`] if
    /// `value` is not the plan's type.
    pub fn encode_value(
        &self,
        value: &dyn Any,
        plan: &Arc<TypePlan>,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        let start = buf.len();
        let mut writer = ValueWriter::new(buf, &self.options);
        self.write_value(&mut writer, value, plan, Slot::Root)?;
        trace!(type_name = plan.name(), bytes = writer.len() - start, "encoded value");
        Ok(())
    }

    /// Encode `value` and write it to `writer`.
    ///
    /// # Errors
    ///
    /// See [`encode`](Self::encode), plus [`EncodeError::Io`].
    pub fn write_to<T: Reflect, W: Write>(&self, value: &T, mut writer: W) -> Result<(), EncodeError> {
        let bytes = self.encode(value)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    // ── Recursive writer ─────────────────────────────────────────────

    fn write_value(
        &self,
        w: &mut ValueWriter<'_>,
        value: &dyn Any,
        declared: &Arc<TypePlan>,
        slot: Slot,
    ) -> Result<(), EncodeError> {
        let (expected, present) = match declared.shape() {
            PlanShape::Nullable { info, inner } => {
                let present = (info.get)(value)?;
                // `Some(TypeRef::null())` would share the encoding of `None`.
                if present
                    .and_then(|present| present.downcast_ref::<TypeRef>())
                    .is_some_and(TypeRef::is_null)
                {
                    return Err(EncodeError::UnexpectedNull {
                        type_name: declared.name().to_owned(),
                    });
                }
                (inner.get(&self.resolver)?, present)
            }
            _ => (declared, Some(value)),
        };

        let Some(value) = present else {
            if declared.writes_type_name(slot, self.options.include_runtime_types) {
                w.put_type_name(expected.name())?;
            }
            return Self::write_null(w, declared, expected, slot);
        };

        let (plan, value) = self.concrete(expected, value)?;
        if declared.writes_type_name(slot, self.options.include_runtime_types) {
            w.put_type_name(plan.name())?;
        }
        if declared.writes_presence(slot) {
            w.put_presence(true);
        }
        self.write_body(w, value, &plan)
    }

    /// Plan and value of the concrete type behind a polymorphic base.
    fn concrete<'v>(
        &self,
        expected: &Arc<TypePlan>,
        value: &'v dyn Any,
    ) -> Result<(Arc<TypePlan>, &'v dyn Any), EncodeError> {
        let PlanShape::Composite {
            runtime: Some(runtime),
            ..
        } = expected.shape()
        else {
            return Ok((Arc::clone(expected), value));
        };
        let dynamic = runtime.resolve(value)?;
        let plan = self.resolver.resolve_handle(
            dynamic.handle,
            self.options.index_width,
            self.options.ignore_index_annotations,
        )?;
        Ok((plan, dynamic.value))
    }

    fn write_null(
        w: &mut ValueWriter<'_>,
        declared: &TypePlan,
        expected: &TypePlan,
        slot: Slot,
    ) -> Result<(), EncodeError> {
        if declared.writes_presence(slot) {
            w.put_presence(false);
            return Ok(());
        }
        match expected.shape() {
            PlanShape::Scalar(info) if info.kind == ScalarKind::Text => w.put_text(None),
            PlanShape::RuntimeTypeRef => w.put_text(None),
            PlanShape::Sequence { .. } | PlanShape::KeyedMap { .. } => {
                w.put_count(expected.name(), None)
            }
            _ => Err(EncodeError::UnexpectedNull {
                type_name: declared.name().to_owned(),
            }),
        }
    }

    fn write_body(
        &self,
        w: &mut ValueWriter<'_>,
        value: &dyn Any,
        plan: &TypePlan,
    ) -> Result<(), EncodeError> {
        match plan.shape() {
            PlanShape::Scalar(info) => w.put_scalar(info, value),
            PlanShape::Enumeration(info) => w.put_enum(info, value),
            PlanShape::RuntimeTypeRef => {
                let type_ref = value
                    .downcast_ref::<TypeRef>()
                    .ok_or_else(TypeError::mismatch::<TypeRef>)?;
                w.put_text(type_ref.name())
            }
            PlanShape::Sequence { info, element } => {
                w.put_count(plan.name(), Some((info.len)(value)?))?;
                let element = element.get(&self.resolver)?;
                for item in (info.elements)(value)? {
                    self.write_value(w, item, element, Slot::Element)?;
                }
                Ok(())
            }
            PlanShape::KeyedMap { info, key, value: value_plan } => {
                w.put_count(plan.name(), Some((info.len)(value)?))?;
                let key = key.get(&self.resolver)?;
                let value_plan = value_plan.get(&self.resolver)?;
                for (entry_key, entry_value) in (info.entries)(value)? {
                    w.put_presence(true);
                    self.write_member(w, ENTRY_KEY_INDEX, ENTRY_KEY_NAME, entry_key, key)?;
                    self.write_member(w, ENTRY_VALUE_INDEX, ENTRY_VALUE_NAME, entry_value, value_plan)?;
                    w.put_end_of_object()?;
                }
                Ok(())
            }
            PlanShape::Composite { members, .. } => {
                for member in members.iter() {
                    let member_value = member.access.get(value)?;
                    let member_plan = member.plan.get(&self.resolver)?;
                    self.write_member(w, member.wire_index, &member.name, member_value, member_plan)?;
                }
                w.put_end_of_object()
            }
            PlanShape::Nullable { .. } => Err(TypeError::NestedNullable {
                type_name: plan.name().to_owned(),
            }
            .into()),
        }
    }

    /// Write `{key}{value}`, or nothing if the value is null.
    fn write_member(
        &self,
        w: &mut ValueWriter<'_>,
        wire_index: u16,
        name: &str,
        value: &dyn Any,
        plan: &Arc<TypePlan>,
    ) -> Result<(), EncodeError> {
        if let PlanShape::Nullable { info, .. } = plan.shape() {
            if (info.get)(value)?.is_none() {
                return Ok(());
            }
        }
        w.put_member_key(wire_index, name)?;
        self.write_value(w, value, plan, Slot::Member)
    }
}
