use std::any::Any;
use std::io::Read;
use std::sync::Arc;

use sbc_types::{BoxedValue, CodecOptions, PlanResolver, PlanShape, Reflect, Slot, TypeError, TypePlan, TypeRef};
use sbc_wire::index::try_index;
use sbc_wire::scalar::integer_from_bytes;
use sbc_wire::text::{decode_text, length_from_prefix};
use sbc_wire::{SpanReader, Step};
use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::DecodeError;
use crate::pool::{BufferPool, HeapPool};
use crate::shared::{
    EntryPart, MemberKey, Selection, capacity, entry_flag, entry_part_by_index, entry_part_by_name,
    entry_parts, finish, member_by_index, member_by_name, null_value, presence_flag,
    select_runtime_plan, undrainable, unwrap_nullable,
};
use crate::streaming::{BlockingDecoder, StreamingDecoder};

/// Binary decoder over a complete in-memory buffer.
///
/// This is the fast path: the whole payload is available, so values are
/// read by straightforward recursion and running out of bytes is simply
/// [`DecodeError::Truncated`]. For input that arrives in pieces use
/// [`DecodeEngine`](crate::DecodeEngine) or the streaming drivers; all
/// paths produce identical values for identical bytes.
///
/// # Usage
///
/// ```rust
/// use sbc_decoder::Decoder;
/// use sbc_encoder::Encoder;
/// use sbc_types::CodecOptions;
///
/// let bytes = Encoder::new(CodecOptions::default()).encode(&vec![1u16, 2]).unwrap();
/// let decoder = Decoder::new(CodecOptions::default());
/// assert_eq!(decoder.decode::<Vec<u16>>(&bytes).unwrap(), vec![1, 2]);
/// ```
pub struct Decoder {
    resolver: Arc<PlanResolver>,
    options: CodecOptions,
    pool: Arc<dyn BufferPool>,
}

impl Decoder {
    /// Create a decoder with its own resolver.
    #[must_use]
    pub fn new(options: CodecOptions) -> Self {
        Self::with_resolver(Arc::new(PlanResolver::new()), options)
    }

    /// Create a decoder sharing an existing resolver.
    #[must_use]
    pub fn with_resolver(resolver: Arc<PlanResolver>, options: CodecOptions) -> Self {
        Self {
            resolver,
            options,
            pool: HeapPool::shared(),
        }
    }

    /// Use `pool` for the scratch buffers of reader-based decoding.
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<PlanResolver> {
        &self.resolver
    }

    /// Decode exactly one `T` occupying all of `bytes`.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`]; [`DecodeError::TrailingData`] if bytes remain
    /// after the value.
    pub fn decode<T: Reflect>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        let (value, consumed) = self.decode_prefix::<T>(bytes)?;
        if consumed < bytes.len() {
            return Err(DecodeError::TrailingData {
                extra_bytes: bytes.len() - consumed,
            });
        }
        Ok(value)
    }

    /// Decode one `T` from the front of `bytes`, returning it with the
    /// number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`] except `TrailingData`.
    pub fn decode_prefix<T: Reflect>(&self, bytes: &[u8]) -> Result<(T, usize), DecodeError> {
        let plan = self.resolver.resolve::<T>(&self.options)?;
        let (value, consumed) = self.decode_value(bytes, &plan)?;
        Ok((downcast(value)?, consumed))
    }

    /// Type-erased [`decode_prefix`](Self::decode_prefix).
    ///
    /// # Errors
    ///
    /// See [`decode_prefix`](Self::decode_prefix).
    pub fn decode_value(
        &self,
        bytes: &[u8],
        plan: &Arc<TypePlan>,
    ) -> Result<(BoxedValue, usize), DecodeError> {
        let mut reader = SpanReader::new(bytes);
        let value = self.read_value(&mut reader, plan, Slot::Root)?;
        Ok((value, reader.position()))
    }

    /// Decode one `T` from a blocking reader, pulling only as many bytes
    /// as the value needs beyond the driver's read granularity.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`]; `Truncated` if the reader is empty.
    pub fn decode_from_reader<T: Reflect, R: Read>(&self, reader: R) -> Result<T, DecodeError> {
        self.blocking(reader)
            .next::<T>()
            .unwrap_or(Err(DecodeError::Truncated { needed: 1 }))
    }

    /// Async counterpart of [`decode_from_reader`](Self::decode_from_reader).
    ///
    /// # Errors
    ///
    /// See [`decode_from_reader`](Self::decode_from_reader).
    pub async fn decode_from_async_reader<T: Reflect, R: AsyncRead + Unpin>(
        &self,
        reader: R,
    ) -> Result<T, DecodeError> {
        self.streaming(reader)
            .next::<T>()
            .await
            .unwrap_or(Err(DecodeError::Truncated { needed: 1 }))
    }

    /// A driver decoding successive values from `reader`.
    pub fn blocking<R: Read>(&self, reader: R) -> BlockingDecoder<R> {
        BlockingDecoder::new(reader, Arc::clone(&self.resolver), self.options.clone())
            .with_pool(Arc::clone(&self.pool))
    }

    /// Async driver decoding successive values from `reader`.
    pub fn streaming<R: AsyncRead + Unpin>(&self, reader: R) -> StreamingDecoder<R> {
        StreamingDecoder::new(reader, Arc::clone(&self.resolver), self.options.clone())
            .with_pool(Arc::clone(&self.pool))
    }

    // ── Recursive reader ─────────────────────────────────────────────

    fn read_value(
        &self,
        reader: &mut SpanReader<'_>,
        declared: &Arc<TypePlan>,
        slot: Slot,
    ) -> Result<BoxedValue, DecodeError> {
        let expected = unwrap_nullable(&self.resolver, declared)?;
        let selection = if declared.writes_type_name(slot, self.options.include_runtime_types) {
            let name = self.read_text(reader)?;
            select_runtime_plan(&self.resolver, &self.options, &expected, name.as_deref())?
        } else {
            Selection::keep(&expected)
        };
        self.read_framed(reader, declared, &selection, slot)
    }

    /// Everything after the type name: presence flag, then body.
    fn read_framed(
        &self,
        reader: &mut SpanReader<'_>,
        declared: &Arc<TypePlan>,
        selection: &Selection,
        slot: Slot,
    ) -> Result<BoxedValue, DecodeError> {
        if declared.writes_presence(slot) && !presence_flag(ready(reader.try_u8())?)? {
            return null_value(declared);
        }
        match self.read_body(reader, &selection.plan, declared.is_nullable())? {
            Some(value) => finish(declared, selection.upcast.as_ref(), value),
            None => null_value(declared),
        }
    }

    /// `None` when the body itself carried a null marker.
    fn read_body(
        &self,
        reader: &mut SpanReader<'_>,
        plan: &Arc<TypePlan>,
        nullable: bool,
    ) -> Result<Option<BoxedValue>, DecodeError> {
        let enc = self.options.text_encoding;
        match plan.shape() {
            PlanShape::Scalar(info) => {
                let width = match info.kind.fixed_width() {
                    Some(width) => width,
                    None => match read_length(reader)? {
                        Some(len) => len,
                        None => return Ok(None),
                    },
                };
                let bytes = ready(reader.try_take(width))?;
                Ok(Some((info.take)(bytes, enc)?))
            }
            PlanShape::Enumeration(info) => {
                let bytes = ready(reader.try_take(info.repr.fixed_width().unwrap_or_default()))?;
                Ok(Some(info.from_raw(integer_from_bytes(info.repr, bytes)?)?))
            }
            PlanShape::RuntimeTypeRef => match self.read_text(reader)? {
                Some(name) => Ok(Some(Box::new(TypeRef::named(name)))),
                None if nullable => Ok(None),
                None => Ok(Some(Box::new(TypeRef::null()))),
            },
            PlanShape::Sequence { info, element } => {
                let Some(count) = read_length(reader)? else {
                    return Ok(None);
                };
                let element = element.get(&self.resolver)?;
                let mut items = (info.with_capacity)(capacity(&self.options, count));
                for _ in 0..count {
                    let item = self.read_value(reader, element, Slot::Element)?;
                    (info.push)(&mut *items, item)?;
                }
                Ok(Some(items))
            }
            PlanShape::KeyedMap { info, key, value } => {
                let Some(count) = read_length(reader)? else {
                    return Ok(None);
                };
                let key = key.get(&self.resolver)?;
                let value = value.get(&self.resolver)?;
                let mut map = (info.with_capacity)(capacity(&self.options, count));
                for _ in 0..count {
                    entry_flag(ready(reader.try_u8())?)?;
                    let (k, v) = self.read_entry(reader, key, value)?;
                    (info.insert)(&mut *map, k, v)?;
                }
                Ok(Some(map))
            }
            PlanShape::Composite { members, .. } => {
                let mut target = plan.instantiate().ok_or_else(|| DecodeError::AbstractType {
                    type_name: plan.name().to_owned(),
                })?;
                loop {
                    let key = if self.options.include_member_names {
                        member_by_name(members, self.read_text(reader)?.as_deref())?
                    } else {
                        member_by_index(members, ready(try_index(reader, self.options.index_width))?)
                    };
                    match key {
                        MemberKey::End => break,
                        MemberKey::Known(member) => {
                            let member_plan = member.plan.get(&self.resolver)?;
                            let value = self.read_value(reader, member_plan, Slot::Member)?;
                            member.access.set(&mut *target, value)?;
                        }
                        MemberKey::Unknown(label) => self.drain(reader, plan, label)?,
                    }
                }
                Ok(Some(target))
            }
            PlanShape::Nullable { .. } => Err(TypeError::NestedNullable {
                type_name: plan.name().to_owned(),
            }
            .into()),
        }
    }

    fn read_entry(
        &self,
        reader: &mut SpanReader<'_>,
        key_plan: &Arc<TypePlan>,
        value_plan: &Arc<TypePlan>,
    ) -> Result<(BoxedValue, BoxedValue), DecodeError> {
        let (mut key, mut value) = (None, None);
        loop {
            let part = if self.options.include_member_names {
                entry_part_by_name(self.read_text(reader)?.as_deref())?
            } else {
                entry_part_by_index(ready(try_index(reader, self.options.index_width))?)?
            };
            match part {
                EntryPart::End => break,
                EntryPart::Key => key = Some(self.read_value(reader, key_plan, Slot::Member)?),
                EntryPart::Value => value = Some(self.read_value(reader, value_plan, Slot::Member)?),
            }
        }
        entry_parts(key_plan, value_plan, key, value)
    }

    /// Skip an unknown member by decoding it as its encoded runtime type.
    fn drain(
        &self,
        reader: &mut SpanReader<'_>,
        owner: &TypePlan,
        label: String,
    ) -> Result<(), DecodeError> {
        if !self.options.include_runtime_types {
            return Err(undrainable(owner, label));
        }
        let name = self.read_text(reader)?;
        let Some(plan) = name.as_deref().and_then(|name| {
            self.resolver.resolve_name(
                name,
                self.options.index_width,
                self.options.ignore_index_annotations,
            )
        }) else {
            return Err(undrainable(owner, label));
        };
        let plan = plan?;
        debug!(owner = owner.name(), member = %label, type_name = plan.name(), "draining unknown member");
        self.read_framed(reader, &plan, &Selection::keep(&plan), Slot::Member)?;
        Ok(())
    }

    fn read_text(&self, reader: &mut SpanReader<'_>) -> Result<Option<String>, DecodeError> {
        let Some(len) = read_length(reader)? else {
            return Ok(None);
        };
        let bytes = ready(reader.try_take(len))?;
        Ok(Some(decode_text(bytes, self.options.text_encoding)?))
    }
}

fn read_length(reader: &mut SpanReader<'_>) -> Result<Option<usize>, DecodeError> {
    Ok(length_from_prefix(ready(reader.try_i32())?)?)
}

/// In the buffered path there is no more input to wait for.
fn ready<T>(step: Step<T>) -> Result<T, DecodeError> {
    match step {
        Step::Ready(value) => Ok(value),
        Step::Pending(needed) => Err(DecodeError::Truncated { needed }),
    }
}

pub(crate) fn downcast<T: Any>(value: BoxedValue) -> Result<T, DecodeError> {
    value
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| TypeError::mismatch::<T>().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_encoder::Encoder;
    use std::collections::{BTreeMap, HashSet};

    fn roundtrip<T: Reflect + PartialEq + std::fmt::Debug>(options: &CodecOptions, value: &T) -> T {
        let bytes = Encoder::new(options.clone()).encode(value).unwrap();
        Decoder::new(options.clone()).decode::<T>(&bytes).unwrap()
    }

    #[test]
    fn scalars_and_text() {
        let options = CodecOptions::default();
        assert_eq!(roundtrip(&options, &-5i64), -5);
        assert_eq!(roundtrip(&options, &String::from("héllo")), "héllo");
        assert_eq!(roundtrip(&options, &Some(3u32)), Some(3));
        assert_eq!(roundtrip(&options, &None::<String>), None);
    }

    #[test]
    fn containers() {
        let options = CodecOptions::default();
        let map = BTreeMap::from([(1u8, Some(String::from("x"))), (2, None)]);
        assert_eq!(roundtrip(&options, &map), map);
        let set: HashSet<i32> = [1, 2, 3].into();
        assert_eq!(roundtrip(&options, &set), set);
        assert_eq!(roundtrip(&options, &None::<Vec<u8>>), None);
    }

    #[test]
    fn name_mode_maps() {
        let options = CodecOptions::default().with_member_names(true);
        let map = BTreeMap::from([(String::from("k"), 9i16)]);
        assert_eq!(roundtrip(&options, &map), map);
    }

    #[test]
    fn type_refs() {
        let options = CodecOptions::default();
        assert_eq!(roundtrip(&options, &TypeRef::of::<u8>()), TypeRef::named("u8"));
        assert_eq!(roundtrip(&options, &TypeRef::null()), TypeRef::null());
        assert_eq!(roundtrip(&options, &None::<TypeRef>), None);
    }

    #[test]
    fn truncated_input() {
        let decoder = Decoder::new(CodecOptions::default());
        let err = decoder.decode::<i32>(&[0x01, 0x02]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { needed: 2 }));
    }

    #[test]
    fn trailing_data_rejected_but_prefix_allowed() {
        let decoder = Decoder::new(CodecOptions::default());
        let err = decoder.decode::<u8>(&[0x01, 0x02]).unwrap_err();
        assert!(matches!(err, DecodeError::TrailingData { extra_bytes: 1 }));
        assert_eq!(decoder.decode_prefix::<u8>(&[0x01, 0x02]).unwrap(), (1, 1));
    }

    #[test]
    fn null_for_non_nullable_is_an_error() {
        let decoder = Decoder::new(CodecOptions::default());
        let err = decoder.decode::<Vec<u8>>(&[0xFF; 4]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedNull { .. }));
    }

    #[test]
    fn from_reader() {
        let bytes = Encoder::new(CodecOptions::default()).encode(&vec![7u64; 3]).unwrap();
        let decoder = Decoder::new(CodecOptions::default());
        assert_eq!(decoder.decode_from_reader::<Vec<u64>, _>(&bytes[..]).unwrap(), vec![7; 3]);
        let err = decoder.decode_from_reader::<u8, _>(&[0u8; 0][..]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }
}
