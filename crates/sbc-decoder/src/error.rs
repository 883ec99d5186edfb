use sbc_types::TypeError;
use sbc_wire::WireError;

/// Errors that can occur while decoding.
///
/// Every variant is fatal for the value being decoded. The two lenient
/// cases (an unknown member that can be drained, an unknown runtime type
/// name) are absorbed inside the decoder and never surface here.
///
/// Error hierarchy:
///
/// ```text
///   DecodeError
///   ├── Truncated            ← input ended while bytes were still required
///   ├── SchemaMismatch       ← runtime type not convertible to the expected type
///   ├── UndrainableMember    ← unknown member whose size cannot be determined
///   ├── MalformedSentinel    ← presence/entry flag or member key is not a valid marker
///   ├── UnexpectedNull       ← null marker for a non-nullable type
///   ├── AbstractType         ← no concrete type to instantiate for a base
///   ├── TrailingData         ← bytes left after the root value
///   ├── Finished             ← decode state already produced its value
///   ├── Type(TypeError)      ← configuration, accessor, or enum discriminant
///   ├── Wire(WireError)      ← invalid scalar payload or length prefix
///   └── Io(std::io::Error)   ← from the underlying reader
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The source was exhausted with at least `needed` more bytes
    /// required to finish the current value.
    #[error("input truncated: at least {needed} more bytes required")]
    Truncated { needed: usize },

    /// The encoded runtime type is known but cannot stand in for the
    /// expected type.
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// A member absent from the target type was encountered, and the
    /// payload carries no runtime type from which to size it.
    #[error("cannot skip unknown member {member} of {type_name} without a known runtime type")]
    UndrainableMember { type_name: String, member: String },

    /// A marker byte or member key held a value that is not valid in its
    /// position.
    #[error("malformed {marker}: found {found}")]
    MalformedSentinel { marker: &'static str, found: String },

    /// A null marker was read for a type that cannot be null.
    #[error("unexpected null for non-nullable {type_name}")]
    UnexpectedNull { type_name: String },

    /// The selected type has no factory (an abstract base without a
    /// runtime type name).
    #[error("cannot instantiate abstract type {type_name}")]
    AbstractType { type_name: String },

    /// Extra bytes were found after the root value.
    #[error("unexpected data after the root value ({extra_bytes} bytes)")]
    TrailingData { extra_bytes: usize },

    /// `advance` was called on a state whose root value is complete.
    #[error("decode state already completed")]
    Finished,

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
