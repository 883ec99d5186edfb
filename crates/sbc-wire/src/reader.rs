/// Outcome of a resumable read.
///
/// `Pending(n)` means at least `n` more bytes must be supplied before the
/// read can succeed. A pending read never consumes input, so the caller
/// can retry the same read once more bytes are available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step<T> {
    Ready(T),
    Pending(usize),
}

impl<T> Step<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Self::Ready(value) => Step::Ready(f(value)),
            Self::Pending(needed) => Step::Pending(needed),
        }
    }
}

/// Cursor over a borrowed span with "try-read" primitives.
///
/// Every read either succeeds and advances the cursor, or reports how
/// many more bytes are needed and leaves the cursor untouched.
///
/// ```text
///   span:  [ consumed | remaining ............ ]
///                     ^ pos
///   try_take(n) with n > remaining  →  Pending(n - remaining), pos unchanged
/// ```
#[derive(Debug)]
pub struct SpanReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SpanReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn try_take(&mut self, n: usize) -> Step<&'a [u8]> {
        let available = self.remaining();
        if n > available {
            return Step::Pending(n - available);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Step::Ready(slice)
    }

    pub fn try_array<const N: usize>(&mut self) -> Step<[u8; N]> {
        match self.try_take(N) {
            Step::Ready(slice) => {
                let mut out = [0u8; N];
                out.copy_from_slice(slice);
                Step::Ready(out)
            }
            Step::Pending(needed) => Step::Pending(needed),
        }
    }

    pub fn try_u8(&mut self) -> Step<u8> {
        self.try_array::<1>().map(|[byte]| byte)
    }

    pub fn try_u16(&mut self) -> Step<u16> {
        self.try_array().map(u16::from_le_bytes)
    }

    pub fn try_i32(&mut self) -> Step<i32> {
        self.try_array().map(i32::from_le_bytes)
    }
}
