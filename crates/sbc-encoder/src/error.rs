use sbc_types::TypeError;
use sbc_wire::WireError;

/// Errors that can occur while encoding a value.
///
/// ```text
///   EncodeError
///   ├── SequenceTooLong   ← more elements than an i32 count can carry
///   ├── UnexpectedNull    ← null with no null marker, or Some(TypeRef::null())
///   ├── Type(TypeError)   ← plan build (configuration) or accessor failure
///   ├── Wire(WireError)   ← scalar with no wire form (char outside BMP, ...)
///   └── Io(io::Error)     ← from Encoder::write_to
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A sequence or map has more than `i32::MAX` elements.
    #[error("{type_name} has {len} elements, more than a 32-bit count allows")]
    SequenceTooLong { type_name: String, len: usize },

    /// A null value was found where the format has no way to mark it, or
    /// a null [`TypeRef`](sbc_types::TypeRef) inside `Option`, whose
    /// encoding would be that of `None`.
    #[error("null {type_name} cannot be encoded in this position")]
    UnexpectedNull { type_name: String },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
