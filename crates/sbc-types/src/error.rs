use sbc_wire::WireError;

/// Errors raised while describing types, building plans, or moving
/// type-erased values through accessors.
///
/// The index and member-count variants are configuration errors: they
/// surface when a plan is first built, before any byte is encoded or
/// decoded, and they never depend on input data.
///
/// # Error hierarchy
///
/// ```text
/// ┌──────────────────────────────────────────────────────────┐
/// │ TypeError (this crate)                                   │
/// │   ├── IndexOutOfRange / TooManyMembers   (configuration) │
/// │   ├── DuplicateIndex / DuplicateName     (configuration) │
/// │   ├── NestedNullable                     (configuration) │
/// │   ├── TypeMismatch for erased downcasts                  │
/// │   ├── InvalidEnumValue for unknown discriminants         │
/// │   └── wraps WireError for scalar payload failures        │
/// └──────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
  /// An annotated member index does not fit the configured index width.
  #[error("{type_name}.{member}: index {index} exceeds the maximum of {max}")]
  IndexOutOfRange {
    type_name: String,
    member: String,
    index: u16,
    max: u16,
  },

  /// A composite has more members than the index width can number.
  #[error("{type_name} has {count} members but the index width allows {max}")]
  TooManyMembers {
    type_name: String,
    count: usize,
    max: u16,
  },

  /// Two members of one composite share a wire index.
  #[error("{type_name}: wire index {index} is used by more than one member")]
  DuplicateIndex { type_name: String, index: u16 },

  /// Two members of one composite share a name.
  #[error("{type_name}: member name {member:?} is used more than once")]
  DuplicateName { type_name: String, member: String },

  /// `Option<Option<T>>` has no distinct wire form.
  #[error("{type_name}: nested nullable types are not supported")]
  NestedNullable { type_name: String },

  /// A type-erased value was not of the type an accessor expected.
  #[error("type mismatch: expected {expected}")]
  TypeMismatch { expected: &'static str },

  /// An enumeration discriminant matched no variant.
  #[error("invalid {enum_name} value: {value}")]
  InvalidEnumValue { enum_name: String, value: i128 },

  #[error(transparent)]
  Wire(#[from] WireError),
}

impl TypeError {
  /// Mismatch error naming `T` as the expected type.
  #[must_use]
  pub fn mismatch<T: ?Sized>() -> Self {
    Self::TypeMismatch {
      expected: std::any::type_name::<T>(),
    }
  }

  /// Whether this error comes from a type's declared shape rather than
  /// from a value.
  #[must_use]
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      Self::IndexOutOfRange { .. }
        | Self::TooManyMembers { .. }
        | Self::DuplicateIndex { .. }
        | Self::DuplicateName { .. }
        | Self::NestedNullable { .. }
    )
  }
}
