use std::ops::Deref;

use bytes::{Buf, BytesMut};

/// A byte accumulator with a hard capacity.
///
/// Bytes are appended at the back and only ever leave from the front, either
/// split off by [`split_to`](Self::split_to) or dropped by [`compact`](Self::compact). `len()` never
/// exceeds the capacity given to [`new`](Self::new).
#[derive(Debug)]
pub struct BoundedBuf {
    buf: BytesMut,
    capacity: usize,
}

impl BoundedBuf {
    /// Create an empty buffer that will hold at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Free space before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Append as much of `data` as fits; returns the number of bytes taken.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..take]);
        take
    }

    /// Remove and return the first `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n > len()`.
    pub fn split_to(&mut self, n: usize) -> BytesMut {
        self.buf.split_to(n)
    }

    /// Keep only the newest half of the capacity, discarding older bytes.
    ///
    /// Returns the number of bytes discarded.
    pub fn compact(&mut self) -> usize {
        let keep = self.capacity / 2;
        let len = self.buf.len();
        if len <= keep {
            return 0;
        }
        let dropped = len - keep;
        self.buf.advance(dropped);
        dropped
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Deref for BoundedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}
