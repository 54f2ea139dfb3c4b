// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Reusable scratch-buffer cache keyed by minimum capacity.
//!
//! The pool is intentionally simple:
//! - an unordered bag of [`ByteBuffer`]s
//! - `get(n)` hands out the smallest pooled buffer with `capacity >= n`, or allocates
//! - `put` clears the buffer and keeps it, up to `max_pooled` buffers
//!
//! When the bag is full, the smallest buffer (pooled or incoming) is dropped so that
//! monotonically growing request sizes cannot pin an unbounded amount of memory.

use crate::buffer::ByteBuffer;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

pub const DEFAULT_MAX_POOLED_BUFFERS: usize = 16;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Maximum number of idle buffers kept for reuse.
    #[serde(default = "default_max_pooled")]
    pub max_pooled: usize,
}

const fn default_max_pooled() -> usize {
    DEFAULT_MAX_POOLED_BUFFERS
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { max_pooled: DEFAULT_MAX_POOLED_BUFFERS }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    /// Buffers dropped because the pool was full.
    pub evicted: u64,
    pub available: usize,
    pub pooled_bytes: usize,
    pub max_pooled: usize,
}

struct PoolInner {
    buffers: Vec<ByteBuffer>,
    max_pooled: usize,
    hits: u64,
    misses: u64,
    evicted: u64,
}

/// Thread-safe pool of [`ByteBuffer`]s. Share it with `Arc` between the owner's threads.
pub struct BufferPool {
    inner: Mutex<PoolInner>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                buffers: Vec::new(),
                max_pooled: config.max_pooled,
                hits: 0,
                misses: 0,
                evicted: 0,
            }),
        }
    }

    /// A cleared buffer with at least `capacity` bytes.
    pub fn get(&self, capacity: usize) -> ByteBuffer {
        let Ok(mut guard) = self.inner.lock() else {
            return ByteBuffer::allocate(capacity);
        };

        let best_fit = guard
            .buffers
            .iter()
            .enumerate()
            .filter(|(_, buf)| buf.capacity() >= capacity)
            .min_by_key(|(_, buf)| buf.capacity())
            .map(|(idx, _)| idx);

        if let Some(idx) = best_fit {
            guard.hits += 1;
            let mut buffer = guard.buffers.swap_remove(idx);
            buffer.clear();
            return buffer;
        }

        guard.misses += 1;
        drop(guard);
        ByteBuffer::allocate(capacity)
    }

    /// Return a buffer the caller exclusively owns.
    pub fn put(&self, mut buffer: ByteBuffer) {
        buffer.clear();
        let Ok(mut guard) = self.inner.lock() else { return };

        if guard.max_pooled == 0 {
            guard.evicted += 1;
            return;
        }

        if guard.buffers.len() < guard.max_pooled {
            guard.buffers.push(buffer);
            return;
        }

        guard.evicted += 1;
        let smallest = guard
            .buffers
            .iter()
            .enumerate()
            .min_by_key(|(_, buf)| buf.capacity())
            .map(|(idx, buf)| (idx, buf.capacity()));
        if let Some((idx, capacity)) = smallest {
            if capacity < buffer.capacity() {
                guard.buffers[idx] = buffer;
            }
        }
    }

    /// Drop every pooled buffer. Safe to call repeatedly.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.buffers.clear();
        }
    }

    pub fn stats(&self) -> PoolStats {
        let Ok(guard) = self.inner.lock() else {
            return PoolStats::default();
        };
        PoolStats {
            hits: guard.hits,
            misses: guard.misses,
            evicted: guard.evicted,
            available: guard.buffers.len(),
            pooled_bytes: guard.buffers.iter().map(ByteBuffer::capacity).sum(),
            max_pooled: guard.max_pooled,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers() {
        let pool = BufferPool::default();
        let mut buf = pool.get(16);
        buf.put_slice(&[1, 2, 3]);
        pool.put(buf);
        assert_eq!(pool.stats().available, 1);

        let buf = pool.get(8);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 16);

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.available, 0);
    }

    #[test]
    fn allocates_when_nothing_is_large_enough() {
        let pool = BufferPool::default();
        pool.put(ByteBuffer::allocate(4));
        let buf = pool.get(32);
        assert_eq!(buf.capacity(), 32);
        // The small buffer stays available for small requests.
        assert_eq!(pool.stats().available, 1);
    }

    #[test]
    fn picks_best_fit() {
        let pool = BufferPool::default();
        pool.put(ByteBuffer::allocate(1024));
        pool.put(ByteBuffer::allocate(64));
        pool.put(ByteBuffer::allocate(256));
        assert_eq!(pool.get(100).capacity(), 256);
    }

    #[test]
    fn bounded_pool_keeps_largest_buffers() {
        let pool = BufferPool::new(BufferPoolConfig { max_pooled: 2 });
        pool.put(ByteBuffer::allocate(10));
        pool.put(ByteBuffer::allocate(20));
        pool.put(ByteBuffer::allocate(30));
        pool.put(ByteBuffer::allocate(5));

        let stats = pool.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.pooled_bytes, 50);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn clear_is_idempotent() {
        let pool = BufferPool::default();
        pool.put(ByteBuffer::allocate(8));
        pool.clear();
        pool.clear();
        assert_eq!(pool.stats().available, 0);
    }
}
