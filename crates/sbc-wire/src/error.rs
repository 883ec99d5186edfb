/// Errors raised while reading or writing wire primitives.
///
/// Every variant carries enough context to locate the problem in a
/// binary payload: offsets for truncation, the raw prefix for bad
/// lengths, and the scalar kind for payloads that failed validation.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Input ended before a complete primitive could be read.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// A length or count prefix was negative but not the null marker.
    #[error("invalid length prefix {value}")]
    InvalidLength { value: i32 },

    /// A text, sequence, or map is too large for a 32-bit prefix.
    #[error("length {len} does not fit in a 32-bit prefix")]
    LengthOverflow { len: usize },

    /// A member index does not fit the configured index width.
    #[error("member index {index} exceeds the maximum of {max}")]
    IndexOverflow { index: u16, max: u16 },

    /// Text bytes are not valid in the configured encoding.
    #[error("invalid {encoding} text")]
    InvalidText { encoding: &'static str },

    /// A `char` outside the basic multilingual plane cannot be written
    /// as a single UTF-16 code unit.
    #[error("char {value:?} does not fit in one UTF-16 code unit")]
    CharOutOfRange { value: char },

    /// A UTF-16 code unit that is a lone surrogate.
    #[error("code unit {value:#06X} is not a valid char")]
    InvalidChar { value: u16 },

    /// An integer value does not fit the enumeration's backing width.
    #[error("value {value} does not fit in {kind}")]
    IntegerOutOfRange { kind: &'static str, value: i128 },

    /// A fixed-width payload held bytes that do not form a valid value
    /// (a bool other than 0/1, an out-of-range timestamp, ...).
    #[error("invalid {kind} payload")]
    InvalidScalar { kind: &'static str },

    /// I/O error during read or write.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
