//! Reusable scratch buffers for encoding during evaluation and sorting.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// A bounded free-list of byte buffers. Clones share the same list.
#[derive(Clone)]
pub struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
    max_retained: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(32)
    }
}

impl BufferPool {
    #[must_use]
    pub fn new(max_retained: usize) -> Self {
        Self { free: Arc::new(Mutex::new(Vec::new())), max_retained }
    }

    /// Takes a cleared buffer; it returns to the pool when dropped.
    #[must_use]
    pub fn acquire(&self) -> PooledBuf {
        let buf = self.free.lock().pop().unwrap_or_default();
        PooledBuf { buf, pool: self.clone() }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

pub struct PooledBuf {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
