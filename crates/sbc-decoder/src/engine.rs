use std::sync::Arc;

use sbc_types::reflect::Upcast;
use sbc_types::{BoxedValue, CodecOptions, PlanResolver, PlanShape, Slot, TypeError, TypePlan, TypeRef};
use sbc_wire::index::try_index;
use sbc_wire::scalar::integer_from_bytes;
use sbc_wire::text::{decode_text, length_from_prefix};
use sbc_wire::{ScalarKind, SpanReader, Step};
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::shared::{
    EntryPart, MemberKey, capacity, entry_flag, entry_part_by_index, entry_part_by_name, entry_parts,
    finish, member_by_index, member_by_name, null_member_name, null_value, presence_flag,
    select_runtime_plan, undrainable, unwrap_nullable,
};

/// Resumable decoder over input that arrives in arbitrary pieces.
///
/// The engine keeps no recursion on the call stack: every value under
/// construction is a frame on an explicit stack inside [`DecodeState`],
/// and each frame records the phase it has reached. When a read needs
/// more bytes than the current span holds, the frame is left untouched
/// and [`advance`](Self::advance) returns [`Progress::NeedMore`]; the
/// same read is retried on the next call.
///
/// ```text
///   advance(span) ──▶ step top frame ──▶ Continue ──┐
///        ▲                 │  │  │                  │
///        │                 │  │  └─ Push(child) ────┤
///        │                 │  └──── Complete(v) ────┤ pop, hand v to parent
///        │                 └─────── Suspend(n) ─────┼─▶ NeedMore { consumed, n }
///        └──────────────────────────────────────────┘
/// ```
///
/// Contract for callers: after `NeedMore { consumed, needed }`, drop the
/// first `consumed` bytes of the span and call again with the rest plus
/// at least `needed` more bytes. Pass `is_final` once the source is
/// exhausted so a suspension becomes [`DecodeError::Truncated`]. After
/// an error the state must be discarded.
pub struct DecodeEngine {
    resolver: Arc<PlanResolver>,
    options: CodecOptions,
}

/// Outcome of one [`DecodeEngine::advance`] call.
pub enum Progress {
    /// The root value is finished after `consumed` bytes of this span.
    Complete { value: BoxedValue, consumed: usize },
    /// Suspended after `consumed` bytes; at least `needed` more are
    /// required past them.
    NeedMore { consumed: usize, needed: usize },
}

/// Decode in progress: the frame stack plus the handoff slot between a
/// finished child and its parent.
pub struct DecodeState {
    stack: Vec<Node>,
    last: Option<BoxedValue>,
    needed: usize,
    offset: usize,
}

impl DecodeState {
    /// Bytes requested by the last suspension.
    #[must_use]
    pub fn needed(&self) -> usize {
        self.needed
    }

    /// Bytes consumed from the span of the last `advance` call.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Frames currently open.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stack.is_empty()
    }
}

// ── Frames ─────────────────────────────────────────────────────────────

enum Node {
    Value(ValueFrame),
    /// Unknown member: its type name is read before a value frame exists.
    Drain(DrainFrame),
}

struct ValueFrame {
    declared: Arc<TypePlan>,
    /// Concrete plan: the declared type unwrapped, then replaced by the
    /// runtime type once its name is read.
    plan: Arc<TypePlan>,
    slot: Slot,
    upcast: Option<Upcast>,
    phase: Phase,
    /// Container or composite under construction.
    value: Option<BoxedValue>,
    /// Elements or entries still to read.
    remaining: usize,
    entry_key: Option<BoxedValue>,
    entry_value: Option<BoxedValue>,
}

struct DrainFrame {
    owner: Arc<TypePlan>,
    member: String,
    phase: DrainPhase,
}

#[derive(Clone, Copy)]
enum DrainPhase {
    NameLength,
    Name { len: usize },
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    TypeNameLength,
    TypeName { len: usize },
    Presence,
    Body,
    Text { len: usize },
    TypeRefName { len: usize },
    Elements,
    AwaitElement,
    EntryPresence,
    EntryKey,
    EntryKeyName { len: usize },
    AwaitEntryPart { part: EntryPart },
    MemberKey,
    MemberName { len: usize },
    AwaitMember { wire_index: u16 },
    AwaitDrain,
}

enum Flow {
    Continue,
    Push(Node),
    Replace(Node),
    Complete(BoxedValue),
    Suspend(usize),
}

/// Unwrap a ready read, or suspend the current frame without touching it.
macro_rules! ready {
    ($step:expr) => {
        match $step {
            Step::Ready(value) => value,
            Step::Pending(needed) => return Ok(Flow::Suspend(needed)),
        }
    };
}

impl DecodeEngine {
    #[must_use]
    pub fn new(resolver: Arc<PlanResolver>, options: CodecOptions) -> Self {
        Self { resolver, options }
    }

    #[must_use]
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Start decoding one root value of `root`'s type.
    ///
    /// # Errors
    ///
    /// Configuration errors from resolving a nullable's inner plan.
    pub fn begin(&self, root: &Arc<TypePlan>) -> Result<DecodeState, DecodeError> {
        Ok(DecodeState {
            stack: vec![self.value_node(root, Slot::Root)?],
            last: None,
            needed: 0,
            offset: 0,
        })
    }

    /// Consume as much of `span` as possible.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`]. `Truncated` only when `is_final` is set.
    /// [`DecodeError::Finished`] if the root value was already returned.
    pub fn advance(
        &self,
        state: &mut DecodeState,
        span: &[u8],
        is_final: bool,
    ) -> Result<Progress, DecodeError> {
        let mut reader = SpanReader::new(span);
        loop {
            let flow = match state.stack.last_mut() {
                None => return Err(DecodeError::Finished),
                Some(Node::Value(frame)) => self.step_value(frame, &mut reader, &mut state.last)?,
                Some(Node::Drain(frame)) => self.step_drain(frame, &mut reader)?,
            };
            match flow {
                Flow::Continue => {}
                Flow::Push(node) => state.stack.push(node),
                Flow::Replace(node) => {
                    state.stack.pop();
                    state.stack.push(node);
                }
                Flow::Complete(value) => {
                    state.stack.pop();
                    if state.stack.is_empty() {
                        state.needed = 0;
                        state.offset = reader.position();
                        return Ok(Progress::Complete {
                            value,
                            consumed: reader.position(),
                        });
                    }
                    state.last = Some(value);
                }
                Flow::Suspend(needed) => {
                    if is_final {
                        return Err(DecodeError::Truncated { needed });
                    }
                    state.needed = needed;
                    state.offset = reader.position();
                    trace!(depth = state.stack.len(), needed, consumed = reader.position(), "decode suspended");
                    return Ok(Progress::NeedMore {
                        consumed: reader.position(),
                        needed,
                    });
                }
            }
        }
    }

    fn value_node(&self, declared: &Arc<TypePlan>, slot: Slot) -> Result<Node, DecodeError> {
        let phase = if declared.writes_type_name(slot, self.options.include_runtime_types) {
            Phase::TypeNameLength
        } else {
            Phase::Presence
        };
        Ok(Node::Value(ValueFrame {
            declared: Arc::clone(declared),
            plan: unwrap_nullable(&self.resolver, declared)?,
            slot,
            upcast: None,
            phase,
            value: None,
            remaining: 0,
            entry_key: None,
            entry_value: None,
        }))
    }

    // ── Value frames ─────────────────────────────────────────────────

    fn step_value(
        &self,
        f: &mut ValueFrame,
        r: &mut SpanReader<'_>,
        last: &mut Option<BoxedValue>,
    ) -> Result<Flow, DecodeError> {
        let enc = self.options.text_encoding;
        match f.phase {
            Phase::TypeNameLength => match length_from_prefix(ready!(r.try_i32()))? {
                Some(len) => f.phase = Phase::TypeName { len },
                None => {
                    self.select(f, None)?;
                    f.phase = Phase::Presence;
                }
            },
            Phase::TypeName { len } => {
                let name = decode_text(ready!(r.try_take(len)), enc)?;
                self.select(f, Some(&name))?;
                f.phase = Phase::Presence;
            }
            Phase::Presence => {
                if f.declared.writes_presence(f.slot) && !presence_flag(ready!(r.try_u8()))? {
                    return Ok(Flow::Complete(null_value(&f.declared)?));
                }
                f.phase = Phase::Body;
            }
            Phase::Body => return self.begin_body(f, r),
            Phase::Text { len } => {
                let bytes = ready!(r.try_take(len));
                let PlanShape::Scalar(info) = f.plan.shape() else {
                    return Err(TypeError::mismatch::<String>().into());
                };
                let value = (info.take)(bytes, enc)?;
                return complete(f, value);
            }
            Phase::TypeRefName { len } => {
                let name = decode_text(ready!(r.try_take(len)), enc)?;
                return complete(f, Box::new(TypeRef::named(name)));
            }
            Phase::Elements => {
                if f.remaining == 0 {
                    return complete_container(f);
                }
                let PlanShape::Sequence { element, .. } = f.plan.shape() else {
                    return Err(shape_mismatch(&f.plan));
                };
                let child = self.value_node(element.get(&self.resolver)?, Slot::Element)?;
                f.remaining -= 1;
                f.phase = Phase::AwaitElement;
                return Ok(Flow::Push(child));
            }
            Phase::AwaitElement => {
                let PlanShape::Sequence { info, .. } = f.plan.shape() else {
                    return Err(shape_mismatch(&f.plan));
                };
                let (Some(items), Some(item)) = (f.value.as_mut(), last.take()) else {
                    return Err(shape_mismatch(&f.plan));
                };
                (info.push)(&mut **items, item)?;
                f.phase = Phase::Elements;
            }
            Phase::EntryPresence => {
                if f.remaining == 0 {
                    return complete_container(f);
                }
                entry_flag(ready!(r.try_u8()))?;
                f.remaining -= 1;
                f.phase = Phase::EntryKey;
            }
            Phase::EntryKey => {
                if self.options.include_member_names {
                    match length_from_prefix(ready!(r.try_i32()))? {
                        None => return Err(null_member_name()),
                        Some(0) => return self.entry_part(f, EntryPart::End),
                        Some(len) => f.phase = Phase::EntryKeyName { len },
                    }
                } else {
                    let index = ready!(try_index(r, self.options.index_width));
                    return self.entry_part(f, entry_part_by_index(index)?);
                }
            }
            Phase::EntryKeyName { len } => {
                let name = decode_text(ready!(r.try_take(len)), enc)?;
                return self.entry_part(f, entry_part_by_name(Some(&name))?);
            }
            Phase::AwaitEntryPart { part } => {
                let value = last.take();
                match part {
                    EntryPart::Key => f.entry_key = value,
                    EntryPart::Value => f.entry_value = value,
                    EntryPart::End => {}
                }
                f.phase = Phase::EntryKey;
            }
            Phase::MemberKey => {
                let plan = Arc::clone(&f.plan);
                let members = plan.members().ok_or_else(|| shape_mismatch(&plan))?;
                let key = if self.options.include_member_names {
                    match length_from_prefix(ready!(r.try_i32()))? {
                        None => return Err(null_member_name()),
                        Some(0) => MemberKey::End,
                        Some(len) => {
                            f.phase = Phase::MemberName { len };
                            return Ok(Flow::Continue);
                        }
                    }
                } else {
                    member_by_index(members, ready!(try_index(r, self.options.index_width)))
                };
                return self.member(f, key);
            }
            Phase::MemberName { len } => {
                let name = decode_text(ready!(r.try_take(len)), enc)?;
                let plan = Arc::clone(&f.plan);
                let members = plan.members().ok_or_else(|| shape_mismatch(&plan))?;
                let key = member_by_name(members, Some(&name))?;
                return self.member(f, key);
            }
            Phase::AwaitMember { wire_index } => {
                let member = f
                    .plan
                    .members()
                    .and_then(|members| members.by_index(wire_index))
                    .ok_or_else(|| shape_mismatch(&f.plan))?;
                let (Some(target), Some(value)) = (f.value.as_mut(), last.take()) else {
                    return Err(shape_mismatch(&f.plan));
                };
                member.access.set(&mut **target, value)?;
                f.phase = Phase::MemberKey;
            }
            Phase::AwaitDrain => {
                last.take();
                f.phase = Phase::MemberKey;
            }
        }
        Ok(Flow::Continue)
    }

    /// First read of a body; the null markers of text and containers
    /// live here.
    fn begin_body(&self, f: &mut ValueFrame, r: &mut SpanReader<'_>) -> Result<Flow, DecodeError> {
        let plan = Arc::clone(&f.plan);
        match plan.shape() {
            PlanShape::Scalar(info) if info.kind == ScalarKind::Text => {
                match length_from_prefix(ready!(r.try_i32()))? {
                    Some(len) => f.phase = Phase::Text { len },
                    None => return Ok(Flow::Complete(null_value(&f.declared)?)),
                }
            }
            PlanShape::Scalar(info) => {
                let bytes = ready!(r.try_take(info.kind.fixed_width().unwrap_or_default()));
                let value = (info.take)(bytes, self.options.text_encoding)?;
                return complete(f, value);
            }
            PlanShape::Enumeration(info) => {
                let bytes = ready!(r.try_take(info.repr.fixed_width().unwrap_or_default()));
                let value = info.from_raw(integer_from_bytes(info.repr, bytes)?)?;
                return complete(f, value);
            }
            PlanShape::RuntimeTypeRef => match length_from_prefix(ready!(r.try_i32()))? {
                Some(len) => f.phase = Phase::TypeRefName { len },
                None if f.declared.is_nullable() => {
                    return Ok(Flow::Complete(null_value(&f.declared)?));
                }
                None => return complete(f, Box::new(TypeRef::null())),
            },
            PlanShape::Sequence { info, .. } => match length_from_prefix(ready!(r.try_i32()))? {
                Some(count) => {
                    f.value = Some((info.with_capacity)(capacity(&self.options, count)));
                    f.remaining = count;
                    f.phase = Phase::Elements;
                }
                None => return Ok(Flow::Complete(null_value(&f.declared)?)),
            },
            PlanShape::KeyedMap { info, .. } => match length_from_prefix(ready!(r.try_i32()))? {
                Some(count) => {
                    f.value = Some((info.with_capacity)(capacity(&self.options, count)));
                    f.remaining = count;
                    f.phase = Phase::EntryPresence;
                }
                None => return Ok(Flow::Complete(null_value(&f.declared)?)),
            },
            PlanShape::Composite { .. } => {
                let target = plan.instantiate().ok_or_else(|| DecodeError::AbstractType {
                    type_name: plan.name().to_owned(),
                })?;
                f.value = Some(target);
                f.phase = Phase::MemberKey;
            }
            PlanShape::Nullable { .. } => {
                return Err(TypeError::NestedNullable {
                    type_name: plan.name().to_owned(),
                }
                .into());
            }
        }
        Ok(Flow::Continue)
    }

    fn select(&self, f: &mut ValueFrame, name: Option<&str>) -> Result<(), DecodeError> {
        let selection = select_runtime_plan(&self.resolver, &self.options, &f.plan, name)?;
        f.plan = selection.plan;
        f.upcast = selection.upcast;
        Ok(())
    }

    fn member(&self, f: &mut ValueFrame, key: MemberKey<'_>) -> Result<Flow, DecodeError> {
        match key {
            MemberKey::End => complete_container(f),
            MemberKey::Known(member) => {
                let child = self.value_node(member.plan.get(&self.resolver)?, Slot::Member)?;
                f.phase = Phase::AwaitMember {
                    wire_index: member.wire_index,
                };
                Ok(Flow::Push(child))
            }
            MemberKey::Unknown(label) => {
                if !self.options.include_runtime_types {
                    return Err(undrainable(&f.plan, label));
                }
                f.phase = Phase::AwaitDrain;
                Ok(Flow::Push(Node::Drain(DrainFrame {
                    owner: Arc::clone(&f.plan),
                    member: label,
                    phase: DrainPhase::NameLength,
                })))
            }
        }
    }

    fn entry_part(&self, f: &mut ValueFrame, part: EntryPart) -> Result<Flow, DecodeError> {
        let PlanShape::KeyedMap { info, key, value } = f.plan.shape() else {
            return Err(shape_mismatch(&f.plan));
        };
        let key_plan = key.get(&self.resolver)?;
        let value_plan = value.get(&self.resolver)?;
        let child = match part {
            EntryPart::Key => self.value_node(key_plan, Slot::Member)?,
            EntryPart::Value => self.value_node(value_plan, Slot::Member)?,
            EntryPart::End => {
                let (k, v) = entry_parts(key_plan, value_plan, f.entry_key.take(), f.entry_value.take())?;
                let map = f.value.as_mut().ok_or_else(|| shape_mismatch(&f.plan))?;
                (info.insert)(&mut **map, k, v)?;
                f.phase = Phase::EntryPresence;
                return Ok(Flow::Continue);
            }
        };
        f.phase = Phase::AwaitEntryPart { part };
        Ok(Flow::Push(child))
    }

    // ── Drain frames ─────────────────────────────────────────────────

    fn step_drain(&self, f: &mut DrainFrame, r: &mut SpanReader<'_>) -> Result<Flow, DecodeError> {
        match f.phase {
            DrainPhase::NameLength => match length_from_prefix(ready!(r.try_i32()))? {
                Some(len) => f.phase = DrainPhase::Name { len },
                None => return Err(undrainable(&f.owner, std::mem::take(&mut f.member))),
            },
            DrainPhase::Name { len } => {
                let name = decode_text(ready!(r.try_take(len)), self.options.text_encoding)?;
                let Some(plan) = self.resolver.resolve_name(
                    &name,
                    self.options.index_width,
                    self.options.ignore_index_annotations,
                ) else {
                    return Err(undrainable(&f.owner, std::mem::take(&mut f.member)));
                };
                let plan = plan?;
                debug!(owner = f.owner.name(), member = %f.member, type_name = plan.name(), "draining unknown member");
                let Node::Value(mut frame) = self.value_node(&plan, Slot::Member)? else {
                    return Err(shape_mismatch(&plan));
                };
                frame.phase = Phase::Presence;
                return Ok(Flow::Replace(Node::Value(frame)));
            }
        }
        Ok(Flow::Continue)
    }
}

fn complete(f: &ValueFrame, value: BoxedValue) -> Result<Flow, DecodeError> {
    Ok(Flow::Complete(finish(&f.declared, f.upcast.as_ref(), value)?))
}

fn complete_container(f: &mut ValueFrame) -> Result<Flow, DecodeError> {
    let value = f.value.take().ok_or_else(|| shape_mismatch(&f.plan))?;
    complete(f, value)
}

/// A frame's phase disagrees with its plan's shape.
fn shape_mismatch(plan: &TypePlan) -> DecodeError {
    DecodeError::SchemaMismatch {
        expected: plan.name().to_owned(),
        found: "inconsistent decode frame".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decoder;
    use sbc_encoder::Encoder;
    use sbc_types::Reflect;
    use std::collections::BTreeMap;

    fn engine(options: &CodecOptions) -> DecodeEngine {
        DecodeEngine::new(Arc::new(PlanResolver::new()), options.clone())
    }

    /// Feed `bytes` in pieces of `chunk`, honoring the consumed/needed
    /// contract.
    fn feed<T: Reflect>(engine: &DecodeEngine, bytes: &[u8], chunk: usize) -> T {
        let plan = engine.resolver.resolve::<T>(&engine.options).unwrap();
        let mut state = engine.begin(&plan).unwrap();
        let mut pending: Vec<u8> = Vec::new();
        let mut rest = bytes;
        loop {
            let take = chunk.min(rest.len());
            pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            match engine.advance(&mut state, &pending, rest.is_empty()).unwrap() {
                Progress::Complete { value, consumed } => {
                    assert_eq!(consumed, pending.len());
                    return *value.downcast::<T>().unwrap();
                }
                Progress::NeedMore { consumed, needed } => {
                    assert!(needed > 0);
                    pending = pending.split_off(consumed);
                }
            }
        }
    }

    #[test]
    fn byte_at_a_time_matches_buffered() {
        let options = CodecOptions::default();
        let value = BTreeMap::from([
            (String::from("one"), vec![Some(1i32), None]),
            (String::from("two"), vec![]),
        ]);
        let bytes = Encoder::new(options.clone()).encode(&value).unwrap();
        let buffered: BTreeMap<String, Vec<Option<i32>>> = Decoder::new(options.clone()).decode(&bytes).unwrap();
        for chunk in [1, 2, 3, 5, bytes.len()] {
            let chunked: BTreeMap<String, Vec<Option<i32>>> = feed(&engine(&options), &bytes, chunk);
            assert_eq!(chunked, buffered);
        }
    }

    #[test]
    fn suspension_consumes_nothing_from_an_incomplete_read() {
        let options = CodecOptions::default();
        let engine = engine(&options);
        let plan = engine.resolver.resolve::<String>(&options).unwrap();
        let mut state = engine.begin(&plan).unwrap();
        match engine.advance(&mut state, &[0x03, 0x00], false).unwrap() {
            Progress::NeedMore { consumed, needed } => {
                assert_eq!(consumed, 0);
                assert_eq!(needed, 2);
            }
            Progress::Complete { .. } => panic!("string cannot be complete"),
        }
        match engine.advance(&mut state, &[0x03, 0x00, 0x00, 0x00, b'a'], false).unwrap() {
            Progress::NeedMore { consumed, needed } => {
                assert_eq!(consumed, 4);
                assert_eq!(needed, 2);
            }
            Progress::Complete { .. } => panic!("string still incomplete"),
        }
        let Progress::Complete { value, consumed } = engine.advance(&mut state, b"abc", false).unwrap() else {
            panic!("string should be complete");
        };
        assert_eq!(consumed, 3);
        assert_eq!(*value.downcast::<String>().unwrap(), "abc");
        assert!(state.is_complete());
        assert!(matches!(engine.advance(&mut state, &[], true), Err(DecodeError::Finished)));
    }

    #[test]
    fn final_span_turns_suspension_into_truncation() {
        let options = CodecOptions::default();
        let engine = engine(&options);
        let plan = engine.resolver.resolve::<Vec<u16>>(&options).unwrap();
        let mut state = engine.begin(&plan).unwrap();
        let err = engine
            .advance(&mut state, &[0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02], true)
            .err()
            .unwrap();
        assert!(matches!(err, DecodeError::Truncated { needed: 1 }));
    }

    #[test]
    fn depth_tracks_open_frames() {
        let options = CodecOptions::default();
        let engine = engine(&options);
        let plan = engine.resolver.resolve::<Vec<Vec<u8>>>(&options).unwrap();
        let mut state = engine.begin(&plan).unwrap();
        assert_eq!(state.depth(), 1);
        let progress = engine.advance(&mut state, &[0x01, 0x00, 0x00, 0x00, 0x01, 0x00], false).unwrap();
        assert!(matches!(progress, Progress::NeedMore { consumed: 4, needed: 2 }));
        assert_eq!(state.depth(), 2);
        assert_eq!(state.offset(), 4);
        assert_eq!(state.needed(), 2);
    }
}
