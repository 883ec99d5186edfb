#![warn(clippy::pedantic)]

pub mod error;
pub mod index;
pub mod reader;
pub mod scalar;
pub mod text;

pub use error::WireError;
pub use index::{END_OF_OBJECT, IndexWidth};
pub use reader::{SpanReader, Step};
pub use scalar::{ScalarKind, WireScalar};
pub use text::{NULL_LENGTH, TextEncoding};
