use sbc_wire::{IndexWidth, TextEncoding};

/// Codec-wide modes, fixed when an encoder or decoder is constructed.
///
/// The first five fields change the wire format and must match between
/// writer and reader. The last two only affect resource use.
///
/// # Defaults
///
/// | Field                      | Default   |
/// |----------------------------|-----------|
/// | `include_member_names`     | `false`   |
/// | `include_runtime_types`    | `false`   |
/// | `ignore_index_annotations` | `false`   |
/// | `index_width`              | one byte  |
/// | `text_encoding`            | UTF-8     |
/// | `initial_buffer_size`      | 4 KiB     |
/// | `max_preallocation`        | 4096      |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecOptions {
  /// Write member names instead of wire indices, so readers match
  /// members by name.
  pub include_member_names: bool,

  /// Prefix values with their concrete type name. Enables polymorphic
  /// decoding and draining of unknown members.
  pub include_runtime_types: bool,

  /// Number members by declaration order even when indices are annotated.
  pub ignore_index_annotations: bool,

  pub index_width: IndexWidth,

  pub text_encoding: TextEncoding,

  /// Scratch buffer size rented by the streaming drivers.
  pub initial_buffer_size: usize,

  /// Upper bound on the capacity reserved up front for a decoded
  /// sequence or map, whatever count the input claims.
  pub max_preallocation: usize,
}

impl Default for CodecOptions {
  fn default() -> Self {
    Self {
      include_member_names: false,
      include_runtime_types: false,
      ignore_index_annotations: false,
      index_width: IndexWidth::One,
      text_encoding: TextEncoding::Utf8,
      initial_buffer_size: 4096,
      max_preallocation: 4096,
    }
  }
}

impl CodecOptions {
  #[must_use]
  pub fn with_member_names(mut self, enabled: bool) -> Self {
    self.include_member_names = enabled;
    self
  }

  #[must_use]
  pub fn with_runtime_types(mut self, enabled: bool) -> Self {
    self.include_runtime_types = enabled;
    self
  }

  #[must_use]
  pub fn with_ignored_index_annotations(mut self, enabled: bool) -> Self {
    self.ignore_index_annotations = enabled;
    self
  }

  #[must_use]
  pub fn with_index_width(mut self, width: IndexWidth) -> Self {
    self.index_width = width;
    self
  }

  #[must_use]
  pub fn with_text_encoding(mut self, encoding: TextEncoding) -> Self {
    self.text_encoding = encoding;
    self
  }

  #[must_use]
  pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
    self.initial_buffer_size = size.max(1);
    self
  }

  #[must_use]
  pub fn with_max_preallocation(mut self, count: usize) -> Self {
    self.max_preallocation = count;
    self
  }
}
