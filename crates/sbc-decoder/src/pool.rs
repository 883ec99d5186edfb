use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Source of scratch buffers for the streaming drivers.
///
/// Buffers handed to [`give_back`](Self::give_back) have already been
/// zeroed by [`ScratchBuffer`] or [`grow`](Self::grow), so a pool may
/// hand them out again as-is.
pub trait BufferPool: Send + Sync {
    /// A zero-filled buffer of at least `min_len` bytes.
    fn rent(&self, min_len: usize) -> Vec<u8>;

    /// Enlarge `buf` to at least `min_len` bytes, keeping its contents.
    ///
    /// The outgrown buffer is zeroed and handed back to the pool.
    fn grow(&self, buf: &mut Vec<u8>, min_len: usize) {
        if buf.len() < min_len {
            let mut bigger = self.rent(min_len.max(buf.len().saturating_mul(2)));
            bigger[..buf.len()].copy_from_slice(buf);
            let mut old = std::mem::replace(buf, bigger);
            old.fill(0);
            self.give_back(old);
        }
    }

    fn give_back(&self, buf: Vec<u8>);
}

/// Heap-backed pool that keeps a bounded free list.
pub struct HeapPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
}

impl HeapPool {
    #[must_use]
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    /// Process-wide pool used when a driver is not given one.
    #[must_use]
    pub fn shared() -> Arc<dyn BufferPool> {
        static SHARED: OnceLock<Arc<HeapPool>> = OnceLock::new();
        let pool = SHARED.get_or_init(|| Arc::new(HeapPool::new(16)));
        Arc::clone(pool) as Arc<dyn BufferPool>
    }

    /// Buffers currently on the free list.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for HeapPool {
    fn default() -> Self {
        Self::new(16)
    }
}

impl BufferPool for HeapPool {
    fn rent(&self, min_len: usize) -> Vec<u8> {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        match free.iter().position(|buf| buf.capacity() >= min_len) {
            Some(pos) => {
                let mut buf = free.swap_remove(pos);
                buf.resize(min_len.max(buf.len()), 0);
                buf
            }
            None => vec![0; min_len],
        }
    }

    fn give_back(&self, buf: Vec<u8>) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

/// A rented buffer that is zeroed and returned to its pool on drop,
/// whichever way the owning decode exits.
pub struct ScratchBuffer {
    buf: Vec<u8>,
    pool: Arc<dyn BufferPool>,
}

impl ScratchBuffer {
    #[must_use]
    pub fn rent(pool: Arc<dyn BufferPool>, min_len: usize) -> Self {
        let buf = pool.rent(min_len);
        Self { buf, pool }
    }

    /// Enlarge to at least `min_len` bytes, keeping the contents.
    pub fn grow(&mut self, min_len: usize) {
        self.pool.grow(&mut self.buf, min_len);
    }
}

impl Deref for ScratchBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        self.buf.fill(0);
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}
