// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Fixed-capacity byte buffer with a read/write cursor.
//!
//! Mirrors the position/limit/capacity model codecs use for their I/O buffers:
//! `0 <= position <= limit <= capacity`. Writing advances `position`; [`ByteBuffer::flip`]
//! prepares written bytes for reading; [`ByteBuffer::clear`] resets to an empty, writable state.

/// A heap buffer whose capacity never changes after allocation.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Box<[u8]>,
    position: usize,
    limit: usize,
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.data.len())
            .finish()
    }
}

impl ByteBuffer {
    /// Allocate a zeroed buffer.
    pub fn allocate(capacity: usize) -> Self {
        Self { data: vec![0; capacity].into_boxed_slice(), position: 0, limit: capacity }
    }

    /// Wrap existing bytes, ready for reading.
    pub fn wrap(bytes: Vec<u8>) -> Self {
        let limit = bytes.len();
        Self { data: bytes.into_boxed_slice(), position: 0, limit }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub const fn remaining(&self) -> usize {
        self.limit - self.position
    }

    #[inline]
    pub const fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Set the cursor; clamped to `limit`.
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.limit);
    }

    /// Set the limit; clamped to capacity, and pulls `position` back if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.min(self.data.len());
        self.position = self.position.min(self.limit);
    }

    /// Reset to `position = 0, limit = capacity`. Contents are left in place.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.data.len();
    }

    /// Switch from writing to reading: `limit = position, position = 0`.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Copy as much of `src` as fits into the remaining space, returning the byte count.
    pub fn put_slice(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.remaining());
        self.data[self.position..self.position + count].copy_from_slice(&src[..count]);
        self.position += count;
        count
    }

    /// Copy up to `dst.len()` bytes out of the remaining region, returning the byte count.
    pub fn get_slice(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.remaining());
        dst[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        count
    }

    /// Bytes between `position` and `limit`.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Mutable view of bytes between `position` and `limit`.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// The whole backing storage, ignoring cursor state.
    pub fn storage(&self) -> &[u8] {
        &self.data
    }

    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes in `[offset, offset + size)` of the backing storage, clamped to capacity.
    pub fn region(&self, offset: usize, size: usize) -> &[u8] {
        let start = offset.min(self.data.len());
        let end = offset.saturating_add(size).min(self.data.len());
        &self.data[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_flip_read() {
        let mut buf = ByteBuffer::allocate(8);
        assert_eq!(buf.put_slice(&[1, 2, 3]), 3);
        assert_eq!(buf.position(), 3);
        buf.flip();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);

        let mut out = [0u8; 2];
        assert_eq!(buf.get_slice(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(buf.remaining(), 1);
    }

    #[test]
    fn put_truncates_to_remaining() {
        let mut buf = ByteBuffer::allocate(4);
        assert_eq!(buf.put_slice(&[9; 10]), 4);
        assert!(!buf.has_remaining());
    }

    #[test]
    fn clear_restores_full_window() {
        let mut buf = ByteBuffer::wrap(vec![1, 2, 3, 4]);
        buf.set_limit(2);
        buf.set_position(1);
        buf.clear();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 4);
        assert_eq!(buf.capacity(), 4);
    }

    #[test]
    fn region_is_clamped() {
        let buf = ByteBuffer::wrap(vec![1, 2, 3]);
        assert_eq!(buf.region(1, 10), &[2, 3]);
        assert!(buf.region(5, 1).is_empty());
    }
}
