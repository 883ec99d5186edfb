// ── Macro for integer-backed enumerations ─────────────────────────────
//
// An enumeration travels as its discriminant in the backing integer
// width. The macro declares the enum, the discriminant conversion pair
// (to_raw / from_raw), and the Reflect impl that ties them to the
// wire name, while keeping doc comments and derives at the call site.

/// Declare an enumeration together with its [`Reflect`](crate::Reflect)
/// impl.
///
/// ```rust
/// sbc_types::reflect_enum! {
///   #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
///   pub enum Level: u8 as "demo.Level" {
///     #[default]
///     Low = 1,
///     High = 2,
///   }
/// }
///
/// assert_eq!(Level::High.to_raw(), 2);
/// assert_eq!(Level::from_raw(1), Some(Level::Low));
/// assert_eq!(Level::from_raw(9), None);
/// ```
#[macro_export]
macro_rules! reflect_enum {
  (
    $(#[$meta:meta])*
    $vis:vis enum $name:ident : $repr:ty as $wire_name:literal {
      $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
    }
  ) => {
    $(#[$meta])*
    $vis enum $name {
      $( $(#[$vmeta])* $variant ),+
    }

    impl $name {
      /// Discriminant as carried on the wire.
      #[must_use]
      pub fn to_raw(&self) -> i128 {
        match self {
          $( Self::$variant => $value, )+
        }
      }

      /// Variant for a wire discriminant, if any.
      #[must_use]
      pub fn from_raw(raw: i128) -> Option<Self> {
        $(
          if raw == $value {
            return Some(Self::$variant);
          }
        )+
        None
      }
    }

    impl $crate::Reflect for $name {
      fn describe() -> $crate::TypeInfo {
        $crate::TypeInfo::enumeration::<Self>(
          $wire_name,
          <$repr as $crate::sbc_wire::WireScalar>::KIND,
          Self::to_raw,
          Self::from_raw,
        )
      }
    }
  };
}

#[cfg(test)]
mod tests {
  use crate::reflect::{Reflect, TypeKind};

  crate::reflect_enum! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Signal: i16 as "test.Signal" {
      Stop = -1,
      Go = 300,
    }
  }

  #[test]
  fn discriminants_map_both_ways() {
    assert_eq!(Signal::Stop.to_raw(), -1);
    assert_eq!(Signal::from_raw(300), Some(Signal::Go));
    assert_eq!(Signal::from_raw(0), None);
  }

  #[test]
  fn describe_carries_backing_width() {
    let info = Signal::describe();
    assert_eq!(info.name, "test.Signal");
    let TypeKind::Enumeration(e) = info.kind else {
      panic!("expected enumeration");
    };
    assert_eq!(e.repr, sbc_wire::ScalarKind::I16);
    assert!(e.from_raw(42).is_err());
  }
}
