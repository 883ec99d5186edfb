#![warn(clippy::pedantic)]

pub mod encoder;
pub mod error;
pub mod value_writer;

pub use encoder::Encoder;
pub use error::EncodeError;
pub use value_writer::ValueWriter;
