use bytes::BufMut;

use crate::error::WireError;
use crate::reader::{SpanReader, Step};

/// Wire index that terminates a composite's member list.
///
/// Real member indices are stored offset by +1 so that `0` is free.
pub const END_OF_OBJECT: u16 = 0;

/// Number of bytes used for each member index.
///
/// ```text
/// ┌───────┬───────┬──────────────────────┐
/// │ Width │ Bytes │ Usable wire indices  │
/// ├───────┼───────┼──────────────────────┤
/// │ One   │ 1     │ 1..=254              │
/// │ Two   │ 2     │ 1..=65534            │
/// └───────┴───────┴──────────────────────┘
/// ```
///
/// The all-ones value of each width is reserved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    #[default]
    One,
    Two,
}

impl IndexWidth {
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    /// Largest wire index (already +1 offset) this width can carry.
    ///
    /// Equal to the number of members a composite may have.
    #[must_use]
    pub const fn max_wire_index(self) -> u16 {
        match self {
            Self::One => 254,
            Self::Two => 65534,
        }
    }
}

/// Write a wire index at the given width.
///
/// # Errors
///
/// [`WireError::IndexOverflow`] if `index` exceeds
/// [`IndexWidth::max_wire_index`].
pub fn put_index<B: BufMut>(buf: &mut B, width: IndexWidth, index: u16) -> Result<(), WireError> {
    let max = width.max_wire_index();
    if index > max {
        return Err(WireError::IndexOverflow { index, max });
    }
    match width {
        IndexWidth::One => buf.put_u8(u8::try_from(index).map_err(|_| WireError::IndexOverflow { index, max })?),
        IndexWidth::Two => buf.put_u16_le(index),
    }
    Ok(())
}

/// Read a wire index at the given width.
pub fn try_index(reader: &mut SpanReader<'_>, width: IndexWidth) -> Step<u16> {
    match width {
        IndexWidth::One => reader.try_u8().map(u16::from),
        IndexWidth::Two => reader.try_u16(),
    }
}
