use bytes::BufMut;

use crate::error::WireError;

/// Length prefix marking a null text, sequence, or map.
///
/// Distinct from `0`, which is an empty but present value.
pub const NULL_LENGTH: i32 = -1;

/// Encoding used for length-prefixed text.
///
/// `char` scalars are unaffected: they are always a single UTF-16 code
/// unit regardless of this setting.
///
/// ```text
/// ┌──────────┬──────────────────────────────┬──────────────────────┐
/// │ Encoding │ Prefix                       │ Payload              │
/// ├──────────┼──────────────────────────────┼──────────────────────┤
/// │ Utf8     │ i32 LE byte length (-1=null) │ UTF-8 bytes          │
/// │ Utf16    │ i32 LE byte length (-1=null) │ UTF-16LE code units  │
/// └──────────┴──────────────────────────────┴──────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16,
}

impl TextEncoding {
    /// Human-readable name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16 => "UTF-16LE",
        }
    }
}

/// Write a 32-bit length or count prefix.
///
/// `None` writes [`NULL_LENGTH`].
///
/// # Errors
///
/// [`WireError::LengthOverflow`] if `len` exceeds `i32::MAX`.
pub fn put_length<B: BufMut>(buf: &mut B, len: Option<usize>) -> Result<(), WireError> {
    let raw = match len {
        Some(len) => i32::try_from(len).map_err(|_| WireError::LengthOverflow { len })?,
        None => NULL_LENGTH,
    };
    buf.put_i32_le(raw);
    Ok(())
}

/// Interpret a raw length prefix.
///
/// Returns `None` for the null marker.
///
/// # Errors
///
/// [`WireError::InvalidLength`] for any other negative value.
pub fn length_from_prefix(raw: i32) -> Result<Option<usize>, WireError> {
    match raw {
        NULL_LENGTH => Ok(None),
        value => usize::try_from(value)
            .map(Some)
            .map_err(|_| WireError::InvalidLength { value }),
    }
}

/// Write a length-prefixed, possibly-null text value.
///
/// # Errors
///
/// [`WireError::LengthOverflow`] if the encoded text exceeds `i32::MAX`
/// bytes.
pub fn put_text<B: BufMut>(
    buf: &mut B,
    text: Option<&str>,
    encoding: TextEncoding,
) -> Result<(), WireError> {
    let Some(text) = text else {
        return put_length(buf, None);
    };
    match encoding {
        TextEncoding::Utf8 => {
            put_length(buf, Some(text.len()))?;
            buf.put_slice(text.as_bytes());
        }
        TextEncoding::Utf16 => {
            let units: Vec<u16> = text.encode_utf16().collect();
            put_length(buf, Some(units.len() * 2))?;
            for unit in units {
                buf.put_u16_le(unit);
            }
        }
    }
    Ok(())
}

/// Decode a text payload whose length prefix has already been read.
///
/// # Errors
///
/// [`WireError::InvalidText`] if `bytes` is not valid in `encoding`
/// (including an odd byte count for UTF-16).
pub fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Result<String, WireError> {
    let invalid = || WireError::InvalidText {
        encoding: encoding.name(),
    };
    match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| invalid()),
        TextEncoding::Utf16 => {
            if bytes.len() % 2 != 0 {
                return Err(invalid());
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).map_err(|_| invalid())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_text_layout() {
        let mut buf = Vec::new();
        put_text(&mut buf, Some("Alice"), TextEncoding::Utf8).unwrap();
        assert_eq!(buf, [0x05, 0x00, 0x00, 0x00, b'A', b'l', b'i', b'c', b'e']);
    }

    #[test]
    fn null_and_empty_are_distinct() {
        let mut null = Vec::new();
        put_text(&mut null, None, TextEncoding::Utf8).unwrap();
        let mut empty = Vec::new();
        put_text(&mut empty, Some(""), TextEncoding::Utf8).unwrap();

        assert_eq!(null, [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(empty, [0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn utf16_prefix_counts_bytes() {
        let mut buf = Vec::new();
        put_text(&mut buf, Some("hé"), TextEncoding::Utf16).unwrap();
        assert_eq!(&buf[..4], &[0x04, 0x00, 0x00, 0x00]);
        assert_eq!(decode_text(&buf[4..], TextEncoding::Utf16).unwrap(), "hé");
    }

    #[test]
    fn utf16_odd_length_rejected() {
        let err = decode_text(&[0x41], TextEncoding::Utf16).unwrap_err();
        assert!(matches!(err, WireError::InvalidText { .. }));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let err = decode_text(&[0xC3, 0x28], TextEncoding::Utf8).unwrap_err();
        assert!(matches!(err, WireError::InvalidText { encoding: "UTF-8" }));
    }

    #[test]
    fn length_prefix_interpretation() {
        assert_eq!(length_from_prefix(-1).unwrap(), None);
        assert_eq!(length_from_prefix(0).unwrap(), Some(0));
        assert_eq!(length_from_prefix(17).unwrap(), Some(17));
        assert!(matches!(
            length_from_prefix(-2),
            Err(WireError::InvalidLength { value: -2 })
        ));
    }
}
