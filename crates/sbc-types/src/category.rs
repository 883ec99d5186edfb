use std::fmt;

use sbc_wire::ScalarKind;

use crate::reflect::TypeKind;

/// The closed classification that drives every encode and decode
/// dispatch.
///
/// ```text
/// ┌────────────────┬──────────────────────────────────────────────┐
/// │ Category       │ Wire form                                    │
/// ├────────────────┼──────────────────────────────────────────────┤
/// │ Scalar         │ fixed-width payload, or length-prefixed text │
/// │ NullableScalar │ [presence flag] payload                      │
/// │ Enumeration    │ backing integer                              │
/// │ RuntimeTypeRef │ length-prefixed type name (-1 = null)        │
/// │ KeyedMap       │ i32 count, then key/value entry composites   │
/// │ Sequence       │ i32 count (-1 = null), then elements         │
/// │ Composite      │ {index|name}{value}... sentinel              │
/// └────────────────┴──────────────────────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueCategory {
  Scalar,
  NullableScalar,
  Enumeration,
  RuntimeTypeRef,
  KeyedMap,
  Sequence,
  Composite,
}

impl fmt::Display for ValueCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Scalar => "scalar",
      Self::NullableScalar => "nullable scalar",
      Self::Enumeration => "enumeration",
      Self::RuntimeTypeRef => "runtime type reference",
      Self::KeyedMap => "keyed map",
      Self::Sequence => "sequence",
      Self::Composite => "composite",
    };
    f.write_str(name)
  }
}

impl TypeKind {
  /// Category of a non-nullable shape, or `None` for `Nullable`.
  #[must_use]
  pub fn base_category(&self) -> Option<ValueCategory> {
    Some(match self {
      Self::Scalar(_) => ValueCategory::Scalar,
      Self::Enumeration(_) => ValueCategory::Enumeration,
      Self::RuntimeTypeRef => ValueCategory::RuntimeTypeRef,
      Self::Sequence(_) => ValueCategory::Sequence,
      Self::KeyedMap(_) => ValueCategory::KeyedMap,
      Self::Composite(_) => ValueCategory::Composite,
      Self::Nullable(_) => return None,
    })
  }

  /// Category of `Option<inner>` given the inner shape.
  ///
  /// Nullable text stays `Scalar` because its length prefix already has a
  /// null marker. Other scalars gain a presence flag.
  #[must_use]
  pub fn nullable_category(&self) -> Option<ValueCategory> {
    match self {
      Self::Scalar(info) if info.kind == ScalarKind::Text => Some(ValueCategory::Scalar),
      Self::Scalar(_) => Some(ValueCategory::NullableScalar),
      other => other.base_category(),
    }
  }
}
