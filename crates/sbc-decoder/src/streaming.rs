use std::io::Read;
use std::sync::Arc;

use sbc_types::{BoxedValue, CodecOptions, PlanResolver, Reflect, TypePlan};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::decoder::downcast;
use crate::engine::{DecodeEngine, DecodeState, Progress};
use crate::error::DecodeError;
use crate::pool::{BufferPool, HeapPool, ScratchBuffer};

/// Read window over a rented scratch buffer.
///
/// ```text
///   buf:  [ consumed | filled ............ | spare ........ ]
///                    ^ start               ^ end
/// ```
///
/// The buffer is rented on the first refill. Before each refill the filled
/// region is moved to the front. The buffer grows only once it is full,
/// and then by at most its current size, so its length stays within twice
/// the bytes actually received however large a length prefix claims the
/// value is. Bytes past one value stay in the window for the next.
struct Window {
  pool: Arc<dyn BufferPool>,
  initial: usize,
  buf: Option<ScratchBuffer>,
  start: usize,
  end: usize,
}

impl Window {
  fn new(pool: Arc<dyn BufferPool>, size: usize) -> Self {
    Self {
      pool,
      initial: size.max(1),
      buf: None,
      start: 0,
      end: 0,
    }
  }

  fn filled(&self) -> &[u8] {
    match &self.buf {
      Some(buf) => &buf[self.start..self.end],
      None => &[],
    }
  }

  fn is_empty(&self) -> bool {
    self.start == self.end
  }

  fn consume(&mut self, n: usize) {
    self.start += n;
    if self.start == self.end {
      self.start = 0;
      self.end = 0;
    }
  }

  /// Compact, grow if full, and return the spare region.
  fn spare(&mut self, needed: usize) -> &mut [u8] {
    let buf = self
      .buf
      .get_or_insert_with(|| ScratchBuffer::rent(Arc::clone(&self.pool), self.initial));
    if self.start > 0 {
      buf.copy_within(self.start..self.end, 0);
      self.end -= self.start;
      self.start = 0;
    }
    if self.end == buf.len() {
      let before = buf.len();
      buf.grow(before + needed.min(before).max(1));
      debug!(from = before, to = buf.len(), needed, "grew decode buffer");
    }
    &mut buf[self.end..]
  }

  fn commit(&mut self, n: usize) {
    self.end += n;
  }
}

/// What the driver must do after feeding the window to the engine.
enum Pump {
  Done(BoxedValue),
  Fill(usize),
}

fn pump(
  engine: &DecodeEngine,
  state: &mut DecodeState,
  window: &mut Window,
  eof: bool,
) -> Result<Pump, DecodeError> {
  match engine.advance(state, window.filled(), eof)? {
    Progress::Complete { value, consumed } => {
      window.consume(consumed);
      Ok(Pump::Done(value))
    }
    Progress::NeedMore { consumed, needed } => {
      window.consume(consumed);
      Ok(Pump::Fill(needed))
    }
  }
}

/// Asynchronous decoder yielding successive values from an `AsyncRead`.
///
/// Only as much input is held as the value in progress needs; reads
/// happen when the engine suspends. A clean end of input between values
/// ends the stream; an end of input inside a value is
/// [`DecodeError::Truncated`].
///
/// # Example
///
/// ```rust,no_run
/// use sbc_decoder::Decoder;
/// use sbc_types::CodecOptions;
/// use tokio::io::AsyncRead;
///
/// async fn sum(reader: impl AsyncRead + Unpin) -> i64 {
///     let decoder = Decoder::new(CodecOptions::default());
///     let mut stream = decoder.streaming(reader);
///     let mut total = 0;
///     while let Some(value) = stream.next::<i64>().await {
///         total += value.unwrap();
///     }
///     total
/// }
/// ```
pub struct StreamingDecoder<R> {
  reader: R,
  engine: DecodeEngine,
  resolver: Arc<PlanResolver>,
  window: Window,
  eof: bool,
}

impl<R: AsyncRead + Unpin> StreamingDecoder<R> {
  #[must_use]
  pub fn new(reader: R, resolver: Arc<PlanResolver>, options: CodecOptions) -> Self {
    let window = Window::new(HeapPool::shared(), options.initial_buffer_size);
    Self {
      reader,
      engine: DecodeEngine::new(Arc::clone(&resolver), options),
      resolver,
      window,
      eof: false,
    }
  }

  /// Rent the scratch buffer from `pool` instead of the shared pool.
  #[must_use]
  pub fn with_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
    self.window = Window::new(pool, self.engine.options().initial_buffer_size);
    self
  }

  /// Decode the next `T`, or `None` at a clean end of input.
  pub async fn next<T: Reflect>(&mut self) -> Option<Result<T, DecodeError>> {
    let plan = match self.resolver.resolve::<T>(self.engine.options()) {
      Ok(plan) => plan,
      Err(err) => return Some(Err(err.into())),
    };
    let value = self.next_value(&plan).await?;
    Some(value.and_then(downcast))
  }

  /// Type-erased [`next`](Self::next).
  pub async fn next_value(&mut self, plan: &Arc<TypePlan>) -> Option<Result<BoxedValue, DecodeError>> {
    match self.at_end().await {
      Ok(true) => None,
      Ok(false) => Some(self.drive(plan).await),
      Err(err) => Some(Err(err)),
    }
  }

  async fn at_end(&mut self) -> Result<bool, DecodeError> {
    while self.window.is_empty() {
      if self.eof {
        return Ok(true);
      }
      self.fill(1).await?;
    }
    Ok(false)
  }

  async fn drive(&mut self, plan: &Arc<TypePlan>) -> Result<BoxedValue, DecodeError> {
    let mut state = self.engine.begin(plan)?;
    loop {
      match pump(&self.engine, &mut state, &mut self.window, self.eof)? {
        Pump::Done(value) => return Ok(value),
        Pump::Fill(needed) => self.fill(needed).await?,
      }
    }
  }

  async fn fill(&mut self, needed: usize) -> Result<(), DecodeError> {
    let spare = self.window.spare(needed);
    let n = self.reader.read(spare).await?;
    if n == 0 {
      self.eof = true;
    } else {
      self.window.commit(n);
      debug!(bytes = n, "refilled decode buffer");
    }
    Ok(())
  }
}

/// Blocking counterpart of [`StreamingDecoder`] over `std::io::Read`.
pub struct BlockingDecoder<R> {
  reader: R,
  engine: DecodeEngine,
  resolver: Arc<PlanResolver>,
  window: Window,
  eof: bool,
}

impl<R: Read> BlockingDecoder<R> {
  #[must_use]
  pub fn new(reader: R, resolver: Arc<PlanResolver>, options: CodecOptions) -> Self {
    let window = Window::new(HeapPool::shared(), options.initial_buffer_size);
    Self {
      reader,
      engine: DecodeEngine::new(Arc::clone(&resolver), options),
      resolver,
      window,
      eof: false,
    }
  }

  #[must_use]
  pub fn with_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
    self.window = Window::new(pool, self.engine.options().initial_buffer_size);
    self
  }

  /// Decode the next `T`, or `None` at a clean end of input.
  pub fn next<T: Reflect>(&mut self) -> Option<Result<T, DecodeError>> {
    let plan = match self.resolver.resolve::<T>(self.engine.options()) {
      Ok(plan) => plan,
      Err(err) => return Some(Err(err.into())),
    };
    let value = self.next_value(&plan)?;
    Some(value.and_then(downcast))
  }

  pub fn next_value(&mut self, plan: &Arc<TypePlan>) -> Option<Result<BoxedValue, DecodeError>> {
    match self.at_end() {
      Ok(true) => None,
      Ok(false) => Some(self.drive(plan)),
      Err(err) => Some(Err(err)),
    }
  }

  fn at_end(&mut self) -> Result<bool, DecodeError> {
    while self.window.is_empty() {
      if self.eof {
        return Ok(true);
      }
      self.fill(1)?;
    }
    Ok(false)
  }

  fn drive(&mut self, plan: &Arc<TypePlan>) -> Result<BoxedValue, DecodeError> {
    let mut state = self.engine.begin(plan)?;
    loop {
      match pump(&self.engine, &mut state, &mut self.window, self.eof)? {
        Pump::Done(value) => return Ok(value),
        Pump::Fill(needed) => self.fill(needed)?,
      }
    }
  }

  fn fill(&mut self, needed: usize) -> Result<(), DecodeError> {
    let spare = self.window.spare(needed);
    let n = self.reader.read(spare)?;
    if n == 0 {
      self.eof = true;
    } else {
      self.window.commit(n);
      debug!(bytes = n, "refilled decode buffer");
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use sbc_encoder::Encoder;

  fn encode_all<T: Reflect>(values: &[T]) -> Vec<u8> {
    let encoder = Encoder::new(CodecOptions::default());
    let mut bytes = Vec::new();
    for value in values {
      encoder.encode_into(value, &mut bytes).unwrap();
    }
    bytes
  }

  #[tokio::test]
  async fn streaming_yields_each_value_then_ends() {
    let bytes = encode_all(&[String::from("a"), String::from("bcd"), String::new()]);
    let reader = tokio::io::BufReader::new(std::io::Cursor::new(bytes));
    let mut stream = StreamingDecoder::new(reader, Arc::new(PlanResolver::new()), CodecOptions::default());

    let mut values = Vec::new();
    while let Some(value) = stream.next::<String>().await {
      values.push(value.unwrap());
    }
    assert_eq!(values, ["a", "bcd", ""]);
  }

  #[tokio::test]
  async fn streaming_reports_truncation_inside_a_value() {
    let mut bytes = encode_all(&[vec![1u32, 2, 3]]);
    bytes.truncate(bytes.len() - 1);
    let mut stream = StreamingDecoder::new(&bytes[..], Arc::new(PlanResolver::new()), CodecOptions::default());
    let err = stream.next::<Vec<u32>>().await.unwrap().unwrap_err();
    assert!(matches!(err, DecodeError::Truncated { needed: 1 }));
  }

  #[test]
  fn blocking_grows_a_tiny_buffer() {
    let long = "x".repeat(100);
    let bytes = encode_all(&[long.clone(), String::from("y")]);
    let options = CodecOptions::default().with_initial_buffer_size(2);
    let mut decoder = BlockingDecoder::new(&bytes[..], Arc::new(PlanResolver::new()), options);
    assert_eq!(decoder.next::<String>().unwrap().unwrap(), long);
    assert_eq!(decoder.next::<String>().unwrap().unwrap(), "y");
    assert!(decoder.next::<String>().is_none());
  }

  /// Pool that counts rentals and remembers the largest one.
  #[derive(Default)]
  struct Metered {
    rents: AtomicUsize,
    peak: AtomicUsize,
  }

  impl BufferPool for Metered {
    fn rent(&self, min_len: usize) -> Vec<u8> {
      self.rents.fetch_add(1, Ordering::Relaxed);
      self.peak.fetch_max(min_len, Ordering::Relaxed);
      vec![0; min_len]
    }

    fn give_back(&self, _buf: Vec<u8>) {}
  }

  #[test]
  fn huge_length_prefix_on_a_short_reader_stays_small() {
    let pool = Arc::new(Metered::default());
    let bytes = [0x00, 0x00, 0x00, 0x40, b'x'];
    let mut decoder =
      BlockingDecoder::new(&bytes[..], Arc::new(PlanResolver::new()), CodecOptions::default()).with_pool(pool.clone());
    let err = decoder.next::<String>().unwrap().unwrap_err();
    assert!(matches!(err, DecodeError::Truncated { needed: 0x3FFF_FFFF }));
    assert_eq!(pool.peak.load(Ordering::Relaxed), 4096);
  }

  #[test]
  fn growth_tracks_bytes_received() {
    let pool = Arc::new(Metered::default());
    let mut bytes = vec![0x00, 0x00, 0x00, 0x40];
    bytes.extend_from_slice(&[b'x'; 100]);
    let options = CodecOptions::default().with_initial_buffer_size(2);
    let mut decoder = BlockingDecoder::new(&bytes[..], Arc::new(PlanResolver::new()), options).with_pool(pool.clone());
    let err = decoder.next::<String>().unwrap().unwrap_err();
    assert!(matches!(err, DecodeError::Truncated { .. }));
    assert!(pool.peak.load(Ordering::Relaxed) <= 2 * bytes.len());
  }

  #[tokio::test]
  async fn window_is_rented_from_the_chosen_pool_on_first_read() {
    let pool = Arc::new(Metered::default());
    let bytes = encode_all(&[String::from("abc")]);
    let mut stream =
      StreamingDecoder::new(&bytes[..], Arc::new(PlanResolver::new()), CodecOptions::default()).with_pool(pool.clone());
    assert_eq!(pool.rents.load(Ordering::Relaxed), 0);
    assert_eq!(stream.next::<String>().await.unwrap().unwrap(), "abc");
    assert_eq!(pool.rents.load(Ordering::Relaxed), 1);
  }

  #[test]
  fn empty_reader_is_a_clean_end() {
    let mut decoder = BlockingDecoder::new(&[][..], Arc::new(PlanResolver::new()), CodecOptions::default());
    assert!(decoder.next::<u8>().is_none());
  }
}
