use crate::reflect::{Reflect, TypeInfo, TypeKind};

/// A type identity carried as data.
///
/// On the wire this is the type's fully-qualified name as a
/// length-prefixed, possibly-null string. A decoded `TypeRef` can be
/// turned back into a handle through the resolver's name registry.
///
/// A null `TypeRef` and an absent `Option<TypeRef>` would share one
/// encoding, so encoding `Some(TypeRef::null())` is an error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TypeRef {
  name: Option<String>,
}

impl TypeRef {
  #[must_use]
  pub fn of<T: Reflect>() -> Self {
    Self::named(T::describe().name)
  }

  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: Some(name.into()),
    }
  }

  #[must_use]
  pub fn null() -> Self {
    Self { name: None }
  }

  #[must_use]
  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  #[must_use]
  pub fn is_null(&self) -> bool {
    self.name.is_none()
  }
}

impl Reflect for TypeRef {
  fn describe() -> TypeInfo {
    TypeInfo::new::<Self>("type", TypeKind::RuntimeTypeRef)
  }
}
