use std::any::Any;

use sbc_types::CodecOptions;
use sbc_types::reflect::{EnumInfo, ScalarInfo};
use sbc_wire::index::put_index;
use sbc_wire::scalar::put_integer;
use sbc_wire::text::{put_length, put_text};
use sbc_wire::{END_OF_OBJECT, WireError};

use crate::error::EncodeError;

/// Framing-level writer for one encode call.
///
/// `ValueWriter` owns no policy about *which* values get which framing
/// (that lives in the plans); it only knows how each piece of framing is
/// laid out under the codec's options:
///
/// ```text
/// ┌──────────────────┬─────────────────────────────────────────────┐
/// │ Piece            │ Bytes                                       │
/// ├──────────────────┼─────────────────────────────────────────────┤
/// │ presence flag    │ 0x00 absent / 0x01 present                  │
/// │ count            │ i32 LE, -1 = null                           │
/// │ text / type name │ i32 LE byte length (-1 = null), bytes       │
/// │ member key       │ wire index (1 or 2 bytes), or member name   │
/// │ end of object    │ index 0, or an empty name                   │
/// └──────────────────┴─────────────────────────────────────────────┘
/// ```
pub struct ValueWriter<'a> {
    buf: &'a mut Vec<u8>,
    options: &'a CodecOptions,
}

impl<'a> ValueWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>, options: &'a CodecOptions) -> Self {
        Self { buf, options }
    }

    /// Bytes in the underlying buffer, including any written before this
    /// writer was created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_presence(&mut self, present: bool) {
        self.buf.push(u8::from(present));
    }

    /// Write an element count, or the null marker for `None`.
    ///
    /// # Errors
    ///
    /// [`EncodeError::SequenceTooLong`] if `len` exceeds `i32::MAX`.
    pub fn put_count(&mut self, type_name: &str, len: Option<usize>) -> Result<(), EncodeError> {
        put_length(&mut *self.buf, len).map_err(|err| match err {
            WireError::LengthOverflow { len } => EncodeError::SequenceTooLong {
                type_name: type_name.to_owned(),
                len,
            },
            other => other.into(),
        })
    }

    /// # Errors
    ///
    /// [`WireError::LengthOverflow`] for text over `i32::MAX` bytes.
    pub fn put_text(&mut self, text: Option<&str>) -> Result<(), EncodeError> {
        put_text(&mut *self.buf, text, self.options.text_encoding)?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`put_text`](Self::put_text).
    pub fn put_type_name(&mut self, name: &str) -> Result<(), EncodeError> {
        self.put_text(Some(name))
    }

    /// Write a member's key: its name in name mode, its wire index
    /// otherwise.
    ///
    /// # Errors
    ///
    /// [`WireError::IndexOverflow`] if the index does not fit the width.
    pub fn put_member_key(&mut self, wire_index: u16, name: &str) -> Result<(), EncodeError> {
        if self.options.include_member_names {
            self.put_text(Some(name))
        } else {
            put_index(&mut *self.buf, self.options.index_width, wire_index)?;
            Ok(())
        }
    }

    /// # Errors
    ///
    /// Never in practice; shares the signature of the other key writers.
    pub fn put_end_of_object(&mut self) -> Result<(), EncodeError> {
        self.put_member_key(END_OF_OBJECT, "")
    }

    /// # Errors
    ///
    /// Propagates the scalar's encode failure.
    pub fn put_scalar(&mut self, info: &ScalarInfo, value: &dyn Any) -> Result<(), EncodeError> {
        (info.put)(value, &mut *self.buf, self.options.text_encoding)?;
        Ok(())
    }

    /// # Errors
    ///
    /// [`WireError::IntegerOutOfRange`] if the discriminant does not fit
    /// the backing width.
    pub fn put_enum(&mut self, info: &EnumInfo, value: &dyn Any) -> Result<(), EncodeError> {
        let raw = info.to_raw(value)?;
        put_integer(&mut *self.buf, info.repr, raw)?;
        Ok(())
    }
}
