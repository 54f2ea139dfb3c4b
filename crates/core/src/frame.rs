// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Checked-out codec buffers.
//!
//! Codecs keep their buffers in an arena indexed by integer slot. A successful dequeue hands
//! out a [`FrameTag`] for a slot; resolving the tag moves the slot's buffer into a [`Frame`].
//! Both types are move-only: queueing or releasing a frame consumes it, so a frame cannot be
//! touched after it has been handed back to its codec.

use crate::buffer::ByteBuffer;
use crate::types::MediaSample;

/// Opaque handle to a checked-out codec buffer slot.
///
/// Not `Clone`: each tag is resolved at most once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FrameTag(u32);

impl FrameTag {
    /// Codec implementations mint tags for their own slots.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(&self) -> u32 {
        self.0
    }
}

/// Outcome of a dequeue call on either side of a codec.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    /// A buffer slot is ready.
    Frame(FrameTag),
    /// Nothing available within the timeout. Not an error; poll again later.
    TryAgainLater,
    /// The output format is now known. Emitted at most once, before the first data frame.
    OutputFormatChanged,
}

/// A codec buffer plus the sample metadata describing its contents.
///
/// `buffer` belongs to the issuing codec; the holder has exclusive use of it between
/// checkout and return.
#[derive(Debug)]
pub struct Frame {
    tag: u32,
    pub buffer: ByteBuffer,
    pub sample: MediaSample,
}

impl Frame {
    pub const fn new(tag: u32, buffer: ByteBuffer, sample: MediaSample) -> Self {
        Self { tag, buffer, sample }
    }

    pub const fn tag(&self) -> u32 {
        self.tag
    }

    /// The valid payload described by `sample.offset` and `sample.size`.
    pub fn payload(&self) -> &[u8] {
        self.buffer.region(self.sample.offset as usize, self.sample.size as usize)
    }

    /// Give the buffer back to the codec that issued it.
    pub fn into_parts(self) -> (u32, ByteBuffer, MediaSample) {
        (self.tag, self.buffer, self.sample)
    }
}
