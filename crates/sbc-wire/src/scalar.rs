use bytes::BufMut;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::WireError;
use crate::text::{TextEncoding, decode_text, put_text};

/// The closed set of scalar kinds the codec can put on the wire.
///
/// All multi-byte values are little-endian.
///
/// ```text
/// ┌────────────────┬───────┬──────────────────────────────────────┐
/// │ Kind           │ Bytes │ Layout                               │
/// ├────────────────┼───────┼──────────────────────────────────────┤
/// │ Bool           │ 1     │ 0x00 / 0x01                          │
/// │ U8 / I8        │ 1     │                                      │
/// │ I16 / U16      │ 2     │                                      │
/// │ I32 / U32      │ 4     │                                      │
/// │ I64 / U64      │ 8     │                                      │
/// │ F32 / F64      │ 4 / 8 │ IEEE 754                             │
/// │ Decimal        │ 16    │ flags, hi, lo, mid (rust_decimal)    │
/// │ Char           │ 2     │ one UTF-16 code unit                 │
/// │ DateTime       │ 12    │ i64 unix seconds, u32 nanos          │
/// │ DateTimeOffset │ 16    │ i64 unix seconds, u32 nanos, i32 off │
/// │ Duration       │ 12    │ i64 seconds, i32 nanos (same sign)   │
/// │ Uuid           │ 16    │ RFC 4122 byte order                  │
/// │ Text           │ 4 + n │ i32 byte length (-1 = null), bytes   │
/// └────────────────┴───────┴──────────────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    DateTime,
    DateTimeOffset,
    Duration,
    Uuid,
    Text,
}

impl ScalarKind {
    /// Encoded size in bytes, or `None` for length-prefixed text.
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::U8 | Self::I8 => Some(1),
            Self::I16 | Self::U16 | Self::Char => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
            Self::DateTime | Self::Duration => Some(12),
            Self::Decimal | Self::DateTimeOffset | Self::Uuid => Some(16),
            Self::Text => None,
        }
    }

    /// Whether this kind can back an enumeration.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::U8
                | Self::I8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Decimal => "decimal",
            Self::Char => "char",
            Self::DateTime => "datetime",
            Self::DateTimeOffset => "datetime_offset",
            Self::Duration => "duration",
            Self::Uuid => "uuid",
            Self::Text => "string",
        }
    }
}

impl std::fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type with a direct wire representation.
///
/// `put` writes the complete encoding (including the length prefix for
/// text). `take` receives exactly the payload bytes: `fixed_width` bytes
/// for fixed kinds, the bytes after the length prefix for text.
pub trait WireScalar: Sized {
    const KIND: ScalarKind;

    /// # Errors
    ///
    /// Fails if the value has no wire representation (a `char` outside
    /// the BMP, text longer than `i32::MAX` bytes).
    fn put<B: BufMut>(&self, buf: &mut B, encoding: TextEncoding) -> Result<(), WireError>;

    /// # Errors
    ///
    /// [`WireError::InvalidScalar`] (or a kind-specific variant) if the
    /// bytes do not form a valid value.
    fn take(bytes: &[u8], encoding: TextEncoding) -> Result<Self, WireError>;
}

fn invalid(kind: ScalarKind) -> WireError {
    WireError::InvalidScalar { kind: kind.name() }
}

fn fixed<const N: usize>(bytes: &[u8], kind: ScalarKind) -> Result<[u8; N], WireError> {
    bytes.try_into().map_err(|_| invalid(kind))
}

fn field<const N: usize>(bytes: &[u8], at: usize, kind: ScalarKind) -> Result<[u8; N], WireError> {
    bytes
        .get(at..at + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| invalid(kind))
}

fn expect_width(bytes: &[u8], kind: ScalarKind) -> Result<(), WireError> {
    if Some(bytes.len()) == kind.fixed_width() {
        Ok(())
    } else {
        Err(invalid(kind))
    }
}

// ── Numeric primitives ───────────────────────────────────────────────

macro_rules! numeric_scalar {
    ($($ty:ty => $kind:ident, $put:ident;)+) => {$(
        impl WireScalar for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;

            fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
                buf.$put(*self);
                Ok(())
            }

            fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
                Ok(<$ty>::from_le_bytes(fixed(bytes, Self::KIND)?))
            }
        }
    )+};
}

numeric_scalar! {
    u8 => U8, put_u8;
    i8 => I8, put_i8;
    i16 => I16, put_i16_le;
    u16 => U16, put_u16_le;
    i32 => I32, put_i32_le;
    u32 => U32, put_u32_le;
    i64 => I64, put_i64_le;
    u64 => U64, put_u64_le;
    f32 => F32, put_f32_le;
    f64 => F64, put_f64_le;
}

/// Write `value` using the integer width of `kind`.
///
/// Used for enumerations, whose discriminants are carried as `i128`
/// so every backing width fits.
///
/// # Errors
///
/// [`WireError::IntegerOutOfRange`] if `value` does not fit, or
/// [`WireError::InvalidScalar`] if `kind` is not an integer kind.
pub fn put_integer<B: BufMut>(buf: &mut B, kind: ScalarKind, value: i128) -> Result<(), WireError> {
    let out_of_range = |_| WireError::IntegerOutOfRange {
        kind: kind.name(),
        value,
    };
    match kind {
        ScalarKind::U8 => buf.put_u8(u8::try_from(value).map_err(out_of_range)?),
        ScalarKind::I8 => buf.put_i8(i8::try_from(value).map_err(out_of_range)?),
        ScalarKind::I16 => buf.put_i16_le(i16::try_from(value).map_err(out_of_range)?),
        ScalarKind::U16 => buf.put_u16_le(u16::try_from(value).map_err(out_of_range)?),
        ScalarKind::I32 => buf.put_i32_le(i32::try_from(value).map_err(out_of_range)?),
        ScalarKind::U32 => buf.put_u32_le(u32::try_from(value).map_err(out_of_range)?),
        ScalarKind::I64 => buf.put_i64_le(i64::try_from(value).map_err(out_of_range)?),
        ScalarKind::U64 => buf.put_u64_le(u64::try_from(value).map_err(out_of_range)?),
        other => return Err(invalid(other)),
    }
    Ok(())
}

/// Read an integer of width `kind` from exactly `kind.fixed_width()` bytes.
///
/// # Errors
///
/// [`WireError::InvalidScalar`] on a width mismatch or a non-integer kind.
pub fn integer_from_bytes(kind: ScalarKind, bytes: &[u8]) -> Result<i128, WireError> {
    let enc = TextEncoding::Utf8;
    Ok(match kind {
        ScalarKind::U8 => i128::from(u8::take(bytes, enc)?),
        ScalarKind::I8 => i128::from(i8::take(bytes, enc)?),
        ScalarKind::I16 => i128::from(i16::take(bytes, enc)?),
        ScalarKind::U16 => i128::from(u16::take(bytes, enc)?),
        ScalarKind::I32 => i128::from(i32::take(bytes, enc)?),
        ScalarKind::U32 => i128::from(u32::take(bytes, enc)?),
        ScalarKind::I64 => i128::from(i64::take(bytes, enc)?),
        ScalarKind::U64 => i128::from(u64::take(bytes, enc)?),
        other => return Err(invalid(other)),
    })
}

// ── Other fixed-width kinds ──────────────────────────────────────────

impl WireScalar for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }

    fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
        match fixed::<1>(bytes, Self::KIND)? {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(invalid(Self::KIND)),
        }
    }
}

impl WireScalar for char {
    const KIND: ScalarKind = ScalarKind::Char;

    fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
        let unit = u16::try_from(u32::from(*self))
            .map_err(|_| WireError::CharOutOfRange { value: *self })?;
        buf.put_u16_le(unit);
        Ok(())
    }

    fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
        let unit = u16::from_le_bytes(fixed(bytes, Self::KIND)?);
        char::from_u32(u32::from(unit)).ok_or(WireError::InvalidChar { value: unit })
    }
}

impl WireScalar for Decimal {
    const KIND: ScalarKind = ScalarKind::Decimal;

    fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
        buf.put_slice(&self.serialize());
        Ok(())
    }

    fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
        Ok(Decimal::deserialize(fixed(bytes, Self::KIND)?))
    }
}

impl WireScalar for Uuid {
    const KIND: ScalarKind = ScalarKind::Uuid;

    fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
        buf.put_slice(self.as_bytes());
        Ok(())
    }

    fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
        Ok(Uuid::from_bytes(fixed(bytes, Self::KIND)?))
    }
}

// ── Date and time ────────────────────────────────────────────────────

impl WireScalar for NaiveDateTime {
    const KIND: ScalarKind = ScalarKind::DateTime;

    fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
        let instant = self.and_utc();
        buf.put_i64_le(instant.timestamp());
        buf.put_u32_le(instant.timestamp_subsec_nanos());
        Ok(())
    }

    fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
        expect_width(bytes, Self::KIND)?;
        let secs = i64::from_le_bytes(field(bytes, 0, Self::KIND)?);
        let nanos = u32::from_le_bytes(field(bytes, 8, Self::KIND)?);
        DateTime::from_timestamp(secs, nanos)
            .map(|instant| instant.naive_utc())
            .ok_or_else(|| invalid(Self::KIND))
    }
}

impl WireScalar for DateTime<FixedOffset> {
    const KIND: ScalarKind = ScalarKind::DateTimeOffset;

    fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
        buf.put_i64_le(self.timestamp());
        buf.put_u32_le(self.timestamp_subsec_nanos());
        buf.put_i32_le(self.offset().local_minus_utc());
        Ok(())
    }

    fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
        expect_width(bytes, Self::KIND)?;
        let secs = i64::from_le_bytes(field(bytes, 0, Self::KIND)?);
        let nanos = u32::from_le_bytes(field(bytes, 8, Self::KIND)?);
        let offset = i32::from_le_bytes(field(bytes, 12, Self::KIND)?);
        let offset = FixedOffset::east_opt(offset).ok_or_else(|| invalid(Self::KIND))?;
        DateTime::from_timestamp(secs, nanos)
            .map(|instant| instant.with_timezone(&offset))
            .ok_or_else(|| invalid(Self::KIND))
    }
}

impl WireScalar for TimeDelta {
    const KIND: ScalarKind = ScalarKind::Duration;

    fn put<B: BufMut>(&self, buf: &mut B, _: TextEncoding) -> Result<(), WireError> {
        buf.put_i64_le(self.num_seconds());
        buf.put_i32_le(self.subsec_nanos());
        Ok(())
    }

    fn take(bytes: &[u8], _: TextEncoding) -> Result<Self, WireError> {
        expect_width(bytes, Self::KIND)?;
        let secs = i64::from_le_bytes(field(bytes, 0, Self::KIND)?);
        let nanos = i32::from_le_bytes(field(bytes, 8, Self::KIND)?);
        if nanos.unsigned_abs() >= 1_000_000_000 {
            return Err(invalid(Self::KIND));
        }
        TimeDelta::try_seconds(secs)
            .and_then(|whole| whole.checked_add(&TimeDelta::nanoseconds(i64::from(nanos))))
            .ok_or_else(|| invalid(Self::KIND))
    }
}

// ── Text ─────────────────────────────────────────────────────────────

impl WireScalar for String {
    const KIND: ScalarKind = ScalarKind::Text;

    fn put<B: BufMut>(&self, buf: &mut B, encoding: TextEncoding) -> Result<(), WireError> {
        put_text(buf, Some(self), encoding)
    }

    fn take(bytes: &[u8], encoding: TextEncoding) -> Result<Self, WireError> {
        decode_text(bytes, encoding)
    }
}
