#![warn(clippy::pedantic)]

pub mod decoder;
pub mod engine;
pub mod error;
pub mod pool;
pub mod streaming;

mod shared;

pub use decoder::Decoder;
pub use engine::{DecodeEngine, DecodeState, Progress};
pub use error::DecodeError;
pub use pool::{BufferPool, HeapPool, ScratchBuffer};
pub use streaming::{BlockingDecoder, StreamingDecoder};
