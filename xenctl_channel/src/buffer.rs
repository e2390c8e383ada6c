//! Byte ring for staging raw streams such as console output.
//!
//! [`ByteRing`] is a fixed-capacity circular buffer with free-running `u32`
//! cursors. The distance `prod - cons` is the only record of occupancy: zero
//! means empty, the capacity means full. Writes never block; when the ring is
//! short of space they return a short count and the caller re-issues the rest.

use std::io;

use crate::error::{ChannelError, ChannelResult};

/// Fixed-capacity circular byte buffer.
pub struct ByteRing {
    buf: Box<[u8]>,
    prod: u32,
    cons: u32,
}

impl ByteRing {
    /// Capacity of a ring built with [`ByteRing::new`].
    pub const DEFAULT_CAPACITY: usize = 64 * 1024;

    /// Default chunk size for [`ByteRing::peek`] and [`ByteRing::read`]
    /// callers that have no better bound.
    pub const DEFAULT_READ: usize = 1024;

    /// Largest supported capacity; cursor distances must fit in `u32`.
    pub const MAX_CAPACITY: usize = 1 << 31;

    /// Create a ring of [`Self::DEFAULT_CAPACITY`] bytes.
    pub fn new() -> Self {
        Self::allocate(Self::DEFAULT_CAPACITY)
    }

    /// Create a ring of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidCapacity`] unless `capacity` is a power
    /// of two no larger than [`Self::MAX_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> ChannelResult<Self> {
        if !capacity.is_power_of_two() || capacity > Self::MAX_CAPACITY {
            return Err(ChannelError::InvalidCapacity { capacity });
        }
        Ok(Self::allocate(capacity))
    }

    fn allocate(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            prod: 0,
            cons: 0,
        }
    }

    #[inline]
    fn mask(&self, cursor: u32) -> usize {
        cursor as usize & (self.buf.len() - 1)
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently buffered.
    #[inline]
    pub fn len(&self) -> usize {
        self.prod.wrapping_sub(self.cons) as usize
    }

    /// Bytes that can be written before the ring is full.
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// `true` when no bytes are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cons == self.prod
    }

    /// `true` when no byte can be written.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Append as much of `data` as fits and return the count written.
    ///
    /// The copy is split in two when the free region straddles the end of
    /// the storage.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let cap = self.capacity();

        let p = self.mask(self.prod);
        let len1 = data.len().min(cap - p).min(self.free());
        if len1 == 0 {
            return 0;
        }
        self.buf[p..p + len1].copy_from_slice(&data[..len1]);
        self.prod = self.prod.wrapping_add(len1 as u32);

        if len1 == data.len() {
            return len1;
        }

        let p = self.mask(self.prod);
        let len2 = (data.len() - len1).min(cap - p).min(self.free());
        if len2 != 0 {
            self.buf[p..p + len2].copy_from_slice(&data[len1..len1 + len2]);
            self.prod = self.prod.wrapping_add(len2 as u32);
        }

        len1 + len2
    }

    /// Copy up to `out.len()` buffered bytes into `out` without consuming
    /// them. Returns the count copied.
    pub fn peek_into(&self, out: &mut [u8]) -> usize {
        let avail = self.len();
        let c = self.mask(self.cons);

        let len1 = avail.min(self.capacity() - c).min(out.len());
        out[..len1].copy_from_slice(&self.buf[c..c + len1]);

        if len1 < avail && len1 < out.len() {
            let len2 = (out.len() - len1).min(avail - len1);
            out[len1..len1 + len2].copy_from_slice(&self.buf[..len2]);
            return len1 + len2;
        }

        len1
    }

    /// Up to `max` buffered bytes, without consuming them.
    pub fn peek(&self, max: usize) -> Vec<u8> {
        let mut out = vec![0u8; self.len().min(max)];
        let n = self.peek_into(&mut out);
        out.truncate(n);
        out
    }

    /// Remove and return up to `max` buffered bytes.
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        let out = self.peek(max);
        self.cons = self.cons.wrapping_add(out.len() as u32);
        out
    }

    /// Drop up to `max` buffered bytes unseen and return the count dropped.
    pub fn discard(&mut self, max: usize) -> usize {
        let len = self.len().min(max);
        self.cons = self.cons.wrapping_add(len as u32);
        len
    }
}

impl Default for ByteRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ByteRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRing")
            .field("capacity", &self.capacity())
            .field("prod", &self.prod)
            .field("cons", &self.cons)
            .finish()
    }
}

impl io::Read for ByteRing {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.peek_into(buf);
        self.cons = self.cons.wrapping_add(n as u32);
        Ok(n)
    }
}

impl io::Write for ByteRing {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(ByteRing::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
