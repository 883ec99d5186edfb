use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use sbc_wire::{ScalarKind, TextEncoding, WireScalar};

use crate::error::TypeError;

/// An owned value whose concrete type is known only through its plan.
pub type BoxedValue = Box<dyn Any + Send>;

/// Zero-argument constructor for a composite's default instance.
pub type Factory = Arc<dyn Fn() -> BoxedValue + Send + Sync>;

/// Introspection entry point: a type that can describe its own shape.
///
/// Implementations are written by hand (or through [`reflect_enum!`])
/// and replace runtime reflection: the returned [`TypeInfo`] lists the
/// category, members, accessors, and constructors the codec needs.
///
/// `describe` must not call `describe` on related types eagerly. Nested
/// types are referenced through [`TypeHandle`]s so that self-referential
/// types terminate.
///
/// [`reflect_enum!`]: crate::reflect_enum
pub trait Reflect: Any + Send + Sized {
  fn describe() -> TypeInfo;
}

/// Lazy, copyable reference to a [`Reflect`] type.
///
/// Two handles are equal when they refer to the same Rust type.
#[derive(Clone, Copy)]
pub struct TypeHandle {
  type_id: fn() -> TypeId,
  describe: fn() -> TypeInfo,
}

impl TypeHandle {
  #[must_use]
  pub fn of<T: Reflect>() -> Self {
    Self {
      type_id: TypeId::of::<T>,
      describe: T::describe,
    }
  }

  #[must_use]
  pub fn type_id(&self) -> TypeId {
    (self.type_id)()
  }

  #[must_use]
  pub fn describe(&self) -> TypeInfo {
    (self.describe)()
  }
}

impl PartialEq for TypeHandle {
  fn eq(&self, other: &Self) -> bool {
    self.type_id() == other.type_id()
  }
}

impl Eq for TypeHandle {}

impl fmt::Debug for TypeHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("TypeHandle").field(&self.type_id()).finish()
  }
}

/// A borrowed value paired with the handle of its concrete type.
///
/// Returned by polymorphic bases to expose the value behind a trait
/// object.
pub struct Dynamic<'a> {
  pub value: &'a dyn Any,
  pub handle: TypeHandle,
}

impl<'a> Dynamic<'a> {
  pub fn of<T: Reflect>(value: &'a T) -> Self {
    Self {
      value,
      handle: TypeHandle::of::<T>(),
    }
  }
}

/// Everything the plan builder needs to know about one type.
pub struct TypeInfo {
  /// Fully-qualified wire name, written in runtime-type mode.
  pub name: Cow<'static, str>,
  pub type_id: TypeId,
  pub kind: TypeKind,
  /// Conversions into base types this type may stand in for.
  pub upcasts: Vec<Upcast>,
}

/// Shape of a type, before it is classified into a value category.
pub enum TypeKind {
  Scalar(ScalarInfo),
  Enumeration(EnumInfo),
  RuntimeTypeRef,
  Sequence(SequenceInfo),
  KeyedMap(MapInfo),
  Composite(CompositeInfo),
  Nullable(NullableInfo),
}

impl TypeInfo {
  pub(crate) fn new<T: Any>(name: impl Into<Cow<'static, str>>, kind: TypeKind) -> Self {
    Self {
      name: name.into(),
      type_id: TypeId::of::<T>(),
      kind,
      upcasts: Vec::new(),
    }
  }

  /// Describe a type with a direct wire encoding.
  #[must_use]
  pub fn scalar<T: Reflect + WireScalar>(name: &'static str) -> Self {
    Self::new::<T>(
      name,
      TypeKind::Scalar(ScalarInfo {
        kind: T::KIND,
        put: put_scalar::<T>,
        take: take_scalar::<T>,
      }),
    )
  }

  /// Describe an enumeration carried as an integer of width `repr`.
  ///
  /// `from_raw` returns `None` for discriminants with no variant, which
  /// decoding reports as [`TypeError::InvalidEnumValue`].
  pub fn enumeration<E: Reflect>(
    name: impl Into<Cow<'static, str>>,
    repr: ScalarKind,
    to_raw: fn(&E) -> i128,
    from_raw: fn(i128) -> Option<E>,
  ) -> Self {
    let name = name.into();
    let enum_name = name.to_string();
    Self::new::<E>(
      name,
      TypeKind::Enumeration(EnumInfo {
        repr,
        to_raw: Arc::new(move |value: &dyn Any| {
          value
            .downcast_ref::<E>()
            .map(to_raw)
            .ok_or_else(TypeError::mismatch::<E>)
        }),
        from_raw: Arc::new(move |raw: i128| {
          from_raw(raw)
            .map(|value| Box::new(value) as BoxedValue)
            .ok_or_else(|| TypeError::InvalidEnumValue {
              enum_name: enum_name.clone(),
              value: raw,
            })
        }),
      }),
    )
  }

  /// Start describing a composite built from `T::default()`.
  pub fn composite<T: Reflect + Default>(name: impl Into<Cow<'static, str>>) -> CompositeBuilder<T> {
    Self::composite_with(name, T::default)
  }

  /// Start describing a composite built from `factory`.
  pub fn composite_with<T: Reflect>(
    name: impl Into<Cow<'static, str>>,
    factory: fn() -> T,
  ) -> CompositeBuilder<T> {
    CompositeBuilder {
      name: name.into(),
      factory: Arc::new(move || Box::new(factory()) as BoxedValue),
      members: Vec::new(),
      upcasts: Vec::new(),
      _marker: PhantomData,
    }
  }

  /// Describe an abstract base, such as `Box<dyn Trait>`.
  ///
  /// The base has no members and no factory. Encoding asks `runtime` for
  /// the concrete value behind the base; decoding needs a runtime type
  /// name that resolves to a concrete type with an upcast into `B`.
  #[must_use]
  pub fn polymorphic<B: Reflect>(
    name: impl Into<Cow<'static, str>>,
    runtime: for<'a> fn(&'a B) -> Dynamic<'a>,
  ) -> Self {
    Self::new::<B>(
      name,
      TypeKind::Composite(CompositeInfo {
        members: Vec::new(),
        factory: None,
        runtime: Some(Arc::new(RuntimeOf { resolve: runtime })),
      }),
    )
  }

  /// Handles of every type this one refers to directly.
  #[must_use]
  pub fn nested_handles(&self) -> Vec<TypeHandle> {
    match &self.kind {
      TypeKind::Scalar(_) | TypeKind::Enumeration(_) | TypeKind::RuntimeTypeRef => Vec::new(),
      TypeKind::Sequence(info) => vec![info.element],
      TypeKind::KeyedMap(info) => vec![info.key, info.value],
      TypeKind::Nullable(info) => vec![info.inner],
      TypeKind::Composite(info) => info.members.iter().map(|member| member.handle).collect(),
    }
  }
}

// ── Scalars and enumerations ─────────────────────────────────────────

/// Erased encode/decode pair for one scalar type.
#[derive(Clone, Copy)]
pub struct ScalarInfo {
  pub kind: ScalarKind,
  pub put: fn(&dyn Any, &mut Vec<u8>, TextEncoding) -> Result<(), TypeError>,
  /// Receives the payload only: `fixed_width` bytes, or the text bytes
  /// after the length prefix.
  pub take: fn(&[u8], TextEncoding) -> Result<BoxedValue, TypeError>,
}

fn put_scalar<T: WireScalar + Any>(
  value: &dyn Any,
  buf: &mut Vec<u8>,
  encoding: TextEncoding,
) -> Result<(), TypeError> {
  let value = value.downcast_ref::<T>().ok_or_else(TypeError::mismatch::<T>)?;
  value.put(buf, encoding)?;
  Ok(())
}

fn take_scalar<T: WireScalar + Any + Send>(
  bytes: &[u8],
  encoding: TextEncoding,
) -> Result<BoxedValue, TypeError> {
  Ok(Box::new(T::take(bytes, encoding)?))
}

type ToRaw = Arc<dyn Fn(&dyn Any) -> Result<i128, TypeError> + Send + Sync>;
type FromRaw = Arc<dyn Fn(i128) -> Result<BoxedValue, TypeError> + Send + Sync>;

/// Integer-backed enumeration.
#[derive(Clone)]
pub struct EnumInfo {
  pub repr: ScalarKind,
  to_raw: ToRaw,
  from_raw: FromRaw,
}

impl EnumInfo {
  /// # Errors
  ///
  /// [`TypeError::TypeMismatch`] if `value` is not this enumeration.
  pub fn to_raw(&self, value: &dyn Any) -> Result<i128, TypeError> {
    (self.to_raw)(value)
  }

  /// # Errors
  ///
  /// [`TypeError::InvalidEnumValue`] if `raw` names no variant.
  pub fn from_raw(&self, raw: i128) -> Result<BoxedValue, TypeError> {
    (self.from_raw)(raw)
  }
}

// ── Collections and nullables ────────────────────────────────────────

/// Erased access to a sequence container.
#[derive(Clone, Copy)]
pub struct SequenceInfo {
  pub element: TypeHandle,
  pub len: fn(&dyn Any) -> Result<usize, TypeError>,
  pub elements:
    for<'a> fn(&'a dyn Any) -> Result<Box<dyn Iterator<Item = &'a dyn Any> + 'a>, TypeError>,
  pub with_capacity: fn(usize) -> BoxedValue,
  pub push: fn(&mut (dyn Any + Send), BoxedValue) -> Result<(), TypeError>,
}

pub type EntryIter<'a> = Box<dyn Iterator<Item = (&'a dyn Any, &'a dyn Any)> + 'a>;

/// Erased access to a keyed map.
#[derive(Clone, Copy)]
pub struct MapInfo {
  pub key: TypeHandle,
  pub value: TypeHandle,
  pub len: fn(&dyn Any) -> Result<usize, TypeError>,
  pub entries: for<'a> fn(&'a dyn Any) -> Result<EntryIter<'a>, TypeError>,
  pub with_capacity: fn(usize) -> BoxedValue,
  pub insert: fn(&mut (dyn Any + Send), BoxedValue, BoxedValue) -> Result<(), TypeError>,
}

/// Erased access to `Option<T>`.
#[derive(Clone, Copy)]
pub struct NullableInfo {
  pub inner: TypeHandle,
  pub get: for<'a> fn(&'a dyn Any) -> Result<Option<&'a dyn Any>, TypeError>,
  pub wrap: fn(Option<BoxedValue>) -> Result<BoxedValue, TypeError>,
}

// ── Composites ───────────────────────────────────────────────────────

/// Reads and writes one member of a type-erased owner.
pub trait MemberAccess: Send + Sync {
  /// # Errors
  ///
  /// [`TypeError::TypeMismatch`] if `owner` is not the declaring type.
  fn get<'a>(&self, owner: &'a dyn Any) -> Result<&'a dyn Any, TypeError>;

  /// # Errors
  ///
  /// [`TypeError::TypeMismatch`] if `owner` or `value` has the wrong type.
  fn set(&self, owner: &mut (dyn Any + Send), value: BoxedValue) -> Result<(), TypeError>;
}

struct Accessor<T, V, G, S> {
  get: G,
  set: S,
  _marker: PhantomData<fn(T, V)>,
}

impl<T, V, G, S> MemberAccess for Accessor<T, V, G, S>
where
  T: Any,
  V: Any,
  G: Fn(&T) -> &V + Send + Sync,
  S: Fn(&mut T, V) + Send + Sync,
{
  fn get<'a>(&self, owner: &'a dyn Any) -> Result<&'a dyn Any, TypeError> {
    let owner = owner.downcast_ref::<T>().ok_or_else(TypeError::mismatch::<T>)?;
    Ok((self.get)(owner))
  }

  fn set(&self, owner: &mut (dyn Any + Send), value: BoxedValue) -> Result<(), TypeError> {
    let owner = owner.downcast_mut::<T>().ok_or_else(TypeError::mismatch::<T>)?;
    let value = value.downcast::<V>().map_err(|_| TypeError::mismatch::<V>())?;
    (self.set)(owner, *value);
    Ok(())
  }
}

/// Exposes the concrete value behind a polymorphic base.
pub trait ResolveRuntime: Send + Sync {
  /// # Errors
  ///
  /// [`TypeError::TypeMismatch`] if `value` is not the base type.
  fn resolve<'a>(&self, value: &'a dyn Any) -> Result<Dynamic<'a>, TypeError>;
}

struct RuntimeOf<B> {
  resolve: for<'a> fn(&'a B) -> Dynamic<'a>,
}

impl<B: Any> ResolveRuntime for RuntimeOf<B> {
  fn resolve<'a>(&self, value: &'a dyn Any) -> Result<Dynamic<'a>, TypeError> {
    let base = value.downcast_ref::<B>().ok_or_else(TypeError::mismatch::<B>)?;
    Ok((self.resolve)(base))
  }
}

/// Conversion of a concrete value into a base type it implements.
#[derive(Clone)]
pub struct Upcast {
  pub target: TypeId,
  cast: Arc<dyn Fn(BoxedValue) -> Result<BoxedValue, TypeError> + Send + Sync>,
}

impl Upcast {
  /// # Errors
  ///
  /// [`TypeError::TypeMismatch`] if `value` is not the source type.
  pub fn apply(&self, value: BoxedValue) -> Result<BoxedValue, TypeError> {
    (self.cast)(value)
  }
}

/// One declared member of a composite.
#[derive(Clone)]
pub struct MemberInfo {
  pub name: Cow<'static, str>,
  pub handle: TypeHandle,
  /// Zero-based index annotation, if any.
  pub index: Option<u16>,
  /// Opted out of encoding.
  pub ignored: bool,
  pub access: Arc<dyn MemberAccess>,
}

#[derive(Clone)]
pub struct CompositeInfo {
  pub members: Vec<MemberInfo>,
  /// `None` for abstract bases.
  pub factory: Option<Factory>,
  pub runtime: Option<Arc<dyn ResolveRuntime>>,
}

/// Builder for a composite's [`TypeInfo`].
///
/// Members are listed in declaration order. [`index`](Self::index) and
/// [`ignore`](Self::ignore) modify the most recently added member.
///
/// ```rust
/// use sbc_types::{Reflect, TypeInfo};
///
/// #[derive(Default)]
/// struct Point { x: i32, y: i32, cached: Option<String> }
///
/// impl Reflect for Point {
///   fn describe() -> TypeInfo {
///     TypeInfo::composite::<Self>("geo.Point")
///       .member("X", |p| &p.x, |p, v| p.x = v)
///       .member("Y", |p| &p.y, |p, v| p.y = v)
///       .member("Cached", |p| &p.cached, |p, v| p.cached = v)
///       .ignore()
///       .build()
///   }
/// }
/// ```
pub struct CompositeBuilder<T> {
  name: Cow<'static, str>,
  factory: Factory,
  members: Vec<MemberInfo>,
  upcasts: Vec<Upcast>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect> CompositeBuilder<T> {
  /// Declare a member with its getter and setter.
  #[must_use]
  pub fn member<V: Reflect>(
    mut self,
    name: impl Into<Cow<'static, str>>,
    get: impl Fn(&T) -> &V + Send + Sync + 'static,
    set: impl Fn(&mut T, V) + Send + Sync + 'static,
  ) -> Self {
    self.members.push(MemberInfo {
      name: name.into(),
      handle: TypeHandle::of::<V>(),
      index: None,
      ignored: false,
      access: Arc::new(Accessor {
        get,
        set,
        _marker: PhantomData::<fn(T, V)>,
      }),
    });
    self
  }

  /// Annotate the last member with a zero-based wire index.
  #[must_use]
  pub fn index(mut self, index: u16) -> Self {
    if let Some(member) = self.members.last_mut() {
      member.index = Some(index);
    }
    self
  }

  /// Exclude the last member from encoding and decoding.
  #[must_use]
  pub fn ignore(mut self) -> Self {
    if let Some(member) = self.members.last_mut() {
      member.ignored = true;
    }
    self
  }

  /// Declare that `T` may stand in for `B`.
  #[must_use]
  pub fn implements<B: Reflect>(mut self, cast: fn(T) -> B) -> Self {
    self.upcasts.push(Upcast {
      target: TypeId::of::<B>(),
      cast: Arc::new(move |value: BoxedValue| {
        let value = value.downcast::<T>().map_err(|_| TypeError::mismatch::<T>())?;
        Ok(Box::new(cast(*value)) as BoxedValue)
      }),
    });
    self
  }

  #[must_use]
  pub fn build(self) -> TypeInfo {
    let mut info = TypeInfo::new::<T>(
      self.name,
      TypeKind::Composite(CompositeInfo {
        members: self.members,
        factory: Some(self.factory),
        runtime: None,
      }),
    );
    info.upcasts = self.upcasts;
    info
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Pair {
    left: i32,
    right: String,
  }

  impl Reflect for Pair {
    fn describe() -> TypeInfo {
      TypeInfo::composite::<Self>("test.Pair")
        .member("Left", |p| &p.left, |p, v| p.left = v)
        .index(4)
        .member("Right", |p| &p.right, |p, v| p.right = v)
        .build()
    }
  }

  #[test]
  fn builder_modifiers_apply_to_last_member() {
    let TypeKind::Composite(info) = Pair::describe().kind else {
      panic!("expected composite");
    };
    assert_eq!(info.members.len(), 2);
    assert_eq!(info.members[0].index, Some(4));
    assert_eq!(info.members[1].index, None);
    assert!(info.factory.is_some());
  }

  #[test]
  fn accessors_round_trip_through_any() {
    let TypeKind::Composite(info) = Pair::describe().kind else {
      panic!("expected composite");
    };
    let mut pair: BoxedValue = Box::new(Pair::default());
    info.members[1]
      .access
      .set(&mut *pair, Box::new(String::from("hi")))
      .unwrap();
    let value = info.members[1].access.get(&*pair).unwrap();
    assert_eq!(value.downcast_ref::<String>().unwrap(), "hi");
  }

  #[test]
  fn setter_rejects_wrong_value_type() {
    let TypeKind::Composite(info) = Pair::describe().kind else {
      panic!("expected composite");
    };
    let mut pair: BoxedValue = Box::new(Pair::default());
    let err = info.members[0].access.set(&mut *pair, Box::new(1u8)).unwrap_err();
    assert!(matches!(err, TypeError::TypeMismatch { .. }));
  }

  #[test]
  fn handles_compare_by_type() {
    assert_eq!(TypeHandle::of::<Pair>(), TypeHandle::of::<Pair>());
    assert_ne!(TypeHandle::of::<Pair>(), TypeHandle::of::<i32>());
  }
}
