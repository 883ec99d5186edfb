use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use sbc_wire::WireScalar;
use uuid::Uuid;

use crate::error::TypeError;
use crate::reflect::{
  BoxedValue, EntryIter, MapInfo, NullableInfo, Reflect, SequenceInfo, TypeHandle, TypeInfo,
  TypeKind,
};
use crate::type_ref::TypeRef;

// ── Scalars ──────────────────────────────────────────────────────────

macro_rules! reflect_scalar {
  ($($ty:ty),+ $(,)?) => {
    $(
      impl Reflect for $ty {
        fn describe() -> TypeInfo {
          TypeInfo::scalar::<Self>(<$ty as WireScalar>::KIND.name())
        }
      }
    )+

    /// Types whose wire names are known to every resolver.
    pub(crate) fn builtin_handles() -> Vec<TypeHandle> {
      vec![$(TypeHandle::of::<$ty>(),)+ TypeHandle::of::<TypeRef>()]
    }
  };
}

reflect_scalar! {
  bool, u8, i8, i16, u16, i32, u32, i64, u64, f32, f64,
  Decimal, char, NaiveDateTime, DateTime<FixedOffset>, TimeDelta, Uuid, String,
}

// ── Option<T> ────────────────────────────────────────────────────────

impl<T: Reflect> Reflect for Option<T> {
  fn describe() -> TypeInfo {
    TypeInfo::new::<Self>(
      format!("Option<{}>", T::describe().name),
      TypeKind::Nullable(NullableInfo {
        inner: TypeHandle::of::<T>(),
        get: nullable_get::<T>,
        wrap: nullable_wrap::<T>,
      }),
    )
  }
}

fn nullable_get<T: Reflect>(value: &dyn Any) -> Result<Option<&dyn Any>, TypeError> {
  let value = value
    .downcast_ref::<Option<T>>()
    .ok_or_else(TypeError::mismatch::<Option<T>>)?;
  Ok(value.as_ref().map(|inner| inner as &dyn Any))
}

fn nullable_wrap<T: Reflect>(value: Option<BoxedValue>) -> Result<BoxedValue, TypeError> {
  let value = match value {
    Some(inner) => Some(*inner.downcast::<T>().map_err(|_| TypeError::mismatch::<T>())?),
    None => None,
  };
  Ok(Box::new(value))
}

// ── Sequences ────────────────────────────────────────────────────────

trait SeqStorage: Any + Send + Sized {
  type Item: Reflect;
  const SHAPE: &'static str;

  fn with_len(capacity: usize) -> Self;
  fn push_item(&mut self, item: Self::Item);
  fn item_count(&self) -> usize;
  fn items(&self) -> Box<dyn Iterator<Item = &dyn Any> + '_>;
}

impl<T: Reflect> SeqStorage for Vec<T> {
  type Item = T;
  const SHAPE: &'static str = "Vec";

  fn with_len(capacity: usize) -> Self {
    Vec::with_capacity(capacity)
  }
  fn push_item(&mut self, item: T) {
    self.push(item);
  }
  fn item_count(&self) -> usize {
    self.len()
  }
  fn items(&self) -> Box<dyn Iterator<Item = &dyn Any> + '_> {
    Box::new(self.iter().map(|item| item as &dyn Any))
  }
}

impl<T: Reflect> SeqStorage for VecDeque<T> {
  type Item = T;
  const SHAPE: &'static str = "VecDeque";

  fn with_len(capacity: usize) -> Self {
    VecDeque::with_capacity(capacity)
  }
  fn push_item(&mut self, item: T) {
    self.push_back(item);
  }
  fn item_count(&self) -> usize {
    self.len()
  }
  fn items(&self) -> Box<dyn Iterator<Item = &dyn Any> + '_> {
    Box::new(self.iter().map(|item| item as &dyn Any))
  }
}

impl<T: Reflect + Eq + Hash> SeqStorage for HashSet<T> {
  type Item = T;
  const SHAPE: &'static str = "HashSet";

  fn with_len(capacity: usize) -> Self {
    HashSet::with_capacity(capacity)
  }
  fn push_item(&mut self, item: T) {
    self.insert(item);
  }
  fn item_count(&self) -> usize {
    self.len()
  }
  fn items(&self) -> Box<dyn Iterator<Item = &dyn Any> + '_> {
    Box::new(self.iter().map(|item| item as &dyn Any))
  }
}

impl<T: Reflect + Ord> SeqStorage for BTreeSet<T> {
  type Item = T;
  const SHAPE: &'static str = "BTreeSet";

  fn with_len(_: usize) -> Self {
    BTreeSet::new()
  }
  fn push_item(&mut self, item: T) {
    self.insert(item);
  }
  fn item_count(&self) -> usize {
    self.len()
  }
  fn items(&self) -> Box<dyn Iterator<Item = &dyn Any> + '_> {
    Box::new(self.iter().map(|item| item as &dyn Any))
  }
}

fn sequence_info<S: SeqStorage>() -> TypeInfo {
  TypeInfo::new::<S>(
    format!("{}<{}>", S::SHAPE, S::Item::describe().name),
    TypeKind::Sequence(SequenceInfo {
      element: TypeHandle::of::<S::Item>(),
      len: seq_len::<S>,
      elements: seq_elements::<S>,
      with_capacity: seq_with_capacity::<S>,
      push: seq_push::<S>,
    }),
  )
}

fn seq_len<S: SeqStorage>(value: &dyn Any) -> Result<usize, TypeError> {
  value
    .downcast_ref::<S>()
    .map(S::item_count)
    .ok_or_else(TypeError::mismatch::<S>)
}

fn seq_elements<S: SeqStorage>(
  value: &dyn Any,
) -> Result<Box<dyn Iterator<Item = &dyn Any> + '_>, TypeError> {
  value
    .downcast_ref::<S>()
    .map(S::items)
    .ok_or_else(TypeError::mismatch::<S>)
}

fn seq_with_capacity<S: SeqStorage>(capacity: usize) -> BoxedValue {
  Box::new(S::with_len(capacity))
}

fn seq_push<S: SeqStorage>(target: &mut (dyn Any + Send), item: BoxedValue) -> Result<(), TypeError> {
  let target = target.downcast_mut::<S>().ok_or_else(TypeError::mismatch::<S>)?;
  let item = item
    .downcast::<S::Item>()
    .map_err(|_| TypeError::mismatch::<S::Item>())?;
  target.push_item(*item);
  Ok(())
}

impl<T: Reflect> Reflect for Vec<T> {
  fn describe() -> TypeInfo {
    sequence_info::<Self>()
  }
}

impl<T: Reflect> Reflect for VecDeque<T> {
  fn describe() -> TypeInfo {
    sequence_info::<Self>()
  }
}

impl<T: Reflect + Eq + Hash> Reflect for HashSet<T> {
  fn describe() -> TypeInfo {
    sequence_info::<Self>()
  }
}

impl<T: Reflect + Ord> Reflect for BTreeSet<T> {
  fn describe() -> TypeInfo {
    sequence_info::<Self>()
  }
}

// ── Keyed maps ───────────────────────────────────────────────────────

trait MapStorage: Any + Send + Sized {
  type Key: Reflect;
  type Value: Reflect;
  const SHAPE: &'static str;

  fn with_len(capacity: usize) -> Self;
  fn put_entry(&mut self, key: Self::Key, value: Self::Value);
  fn entry_count(&self) -> usize;
  fn entry_refs(&self) -> EntryIter<'_>;
}

impl<K: Reflect + Eq + Hash, V: Reflect> MapStorage for HashMap<K, V> {
  type Key = K;
  type Value = V;
  const SHAPE: &'static str = "HashMap";

  fn with_len(capacity: usize) -> Self {
    HashMap::with_capacity(capacity)
  }
  fn put_entry(&mut self, key: K, value: V) {
    self.insert(key, value);
  }
  fn entry_count(&self) -> usize {
    self.len()
  }
  fn entry_refs(&self) -> EntryIter<'_> {
    Box::new(self.iter().map(|(k, v)| (k as &dyn Any, v as &dyn Any)))
  }
}

impl<K: Reflect + Ord, V: Reflect> MapStorage for BTreeMap<K, V> {
  type Key = K;
  type Value = V;
  const SHAPE: &'static str = "BTreeMap";

  fn with_len(_: usize) -> Self {
    BTreeMap::new()
  }
  fn put_entry(&mut self, key: K, value: V) {
    self.insert(key, value);
  }
  fn entry_count(&self) -> usize {
    self.len()
  }
  fn entry_refs(&self) -> EntryIter<'_> {
    Box::new(self.iter().map(|(k, v)| (k as &dyn Any, v as &dyn Any)))
  }
}

fn map_info<M: MapStorage>() -> TypeInfo {
  TypeInfo::new::<M>(
    format!(
      "{}<{}, {}>",
      M::SHAPE,
      M::Key::describe().name,
      M::Value::describe().name
    ),
    TypeKind::KeyedMap(MapInfo {
      key: TypeHandle::of::<M::Key>(),
      value: TypeHandle::of::<M::Value>(),
      len: map_len::<M>,
      entries: map_entries::<M>,
      with_capacity: map_with_capacity::<M>,
      insert: map_insert::<M>,
    }),
  )
}

fn map_len<M: MapStorage>(value: &dyn Any) -> Result<usize, TypeError> {
  value
    .downcast_ref::<M>()
    .map(M::entry_count)
    .ok_or_else(TypeError::mismatch::<M>)
}

fn map_entries<M: MapStorage>(value: &dyn Any) -> Result<EntryIter<'_>, TypeError> {
  value
    .downcast_ref::<M>()
    .map(M::entry_refs)
    .ok_or_else(TypeError::mismatch::<M>)
}

fn map_with_capacity<M: MapStorage>(capacity: usize) -> BoxedValue {
  Box::new(M::with_len(capacity))
}

fn map_insert<M: MapStorage>(
  target: &mut (dyn Any + Send),
  key: BoxedValue,
  value: BoxedValue,
) -> Result<(), TypeError> {
  let target = target.downcast_mut::<M>().ok_or_else(TypeError::mismatch::<M>)?;
  let key = key
    .downcast::<M::Key>()
    .map_err(|_| TypeError::mismatch::<M::Key>())?;
  let value = value
    .downcast::<M::Value>()
    .map_err(|_| TypeError::mismatch::<M::Value>())?;
  target.put_entry(*key, *value);
  Ok(())
}

impl<K: Reflect + Eq + Hash, V: Reflect> Reflect for HashMap<K, V> {
  fn describe() -> TypeInfo {
    map_info::<Self>()
  }
}

impl<K: Reflect + Ord, V: Reflect> Reflect for BTreeMap<K, V> {
  fn describe() -> TypeInfo {
    map_info::<Self>()
  }
}
