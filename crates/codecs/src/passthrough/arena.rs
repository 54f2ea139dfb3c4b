// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Slot arena backing the passthrough codecs.
//!
//! Every slot cycles `Free → DequeuedInput → Queued → DequeuedOutput → Free`. Queued slots
//! leave in the order they were queued, so output order always equals input order.

use mediakit_core::{
    ByteBuffer, Dequeued, Frame, FrameTag, MediaKitError, MediaSample, Result, TranscoderError,
};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    DequeuedInput,
    Queued,
    DequeuedOutput,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    /// `None` while a [`Frame`] holds the buffer.
    buffer: Option<ByteBuffer>,
    sample: MediaSample,
}

#[derive(Debug)]
pub(crate) struct FrameArena {
    codec: &'static str,
    slots: Vec<Slot>,
    available: VecDeque<u32>,
    queued: VecDeque<u32>,
    buffer_capacity: usize,
    released: bool,
}

impl FrameArena {
    pub(crate) fn new(codec: &'static str, pool_size: usize, buffer_capacity: usize) -> Self {
        let mut arena = Self {
            codec,
            slots: Vec::with_capacity(pool_size),
            available: VecDeque::with_capacity(pool_size),
            queued: VecDeque::with_capacity(pool_size),
            buffer_capacity,
            released: false,
        };
        for _ in 0..pool_size {
            arena.grow();
        }
        arena
    }

    /// Add a free slot and return its index.
    pub(crate) fn grow(&mut self) -> u32 {
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            state: SlotState::Free,
            buffer: Some(ByteBuffer::allocate(self.buffer_capacity)),
            sample: MediaSample::default(),
        });
        self.available.push_back(index);
        index
    }

    fn ensure_not_released(&self) -> Result<()> {
        if self.released {
            return Err(TranscoderError::CodecInReleasedState { codec: self.codec.to_string() }.into());
        }
        Ok(())
    }

    fn slot_mut(&mut self, tag: u32) -> Option<&mut Slot> {
        self.slots.get_mut(tag as usize)
    }

    pub(crate) fn dequeue_input(&mut self) -> Result<Dequeued> {
        self.ensure_not_released()?;
        let Some(tag) = self.available.pop_front() else {
            return Ok(Dequeued::TryAgainLater);
        };
        if let Some(slot) = self.slot_mut(tag) {
            slot.state = SlotState::DequeuedInput;
        }
        Ok(Dequeued::Frame(FrameTag::new(tag)))
    }

    pub(crate) fn input_frame(&mut self, tag: &FrameTag) -> Option<Frame> {
        let slot = self.slot_mut(tag.index())?;
        if slot.state != SlotState::DequeuedInput {
            return None;
        }
        let mut buffer = slot.buffer.take()?;
        buffer.clear();
        Some(Frame::new(tag.index(), buffer, MediaSample::default()))
    }

    pub(crate) fn queue_input(&mut self, frame: Frame) -> Result<()> {
        self.ensure_not_released()?;
        let codec = self.codec;
        let (tag, buffer, sample) = frame.into_parts();
        let slot = self
            .slot_mut(tag)
            .filter(|slot| slot.state == SlotState::DequeuedInput && slot.buffer.is_none())
            .ok_or_else(|| MediaKitError::Codec(format!("{codec}: frame {tag} was not dequeued for input")))?;
        slot.buffer = Some(buffer);
        slot.sample = sample;
        slot.state = SlotState::Queued;
        self.queued.push_back(tag);
        Ok(())
    }

    /// Queue a frame produced internally (surface input, end of stream marker).
    pub(crate) fn queue_internal(&mut self, payload: &[u8], sample: MediaSample) -> Result<()> {
        self.ensure_not_released()?;
        let tag = match self.available.pop_front() {
            Some(tag) => tag,
            None => {
                tracing::debug!(codec = self.codec, "Frame arena exhausted, adding a slot");
                let tag = self.grow();
                self.available.pop_back();
                tag
            },
        };
        let capacity = self.buffer_capacity;
        let codec = self.codec;
        let slot = self
            .slot_mut(tag)
            .ok_or_else(|| MediaKitError::Codec(format!("{codec}: missing slot {tag}")))?;
        let mut buffer = match slot.buffer.take() {
            Some(buffer) if buffer.capacity() >= payload.len() => buffer,
            _ => ByteBuffer::allocate(payload.len().max(capacity)),
        };
        buffer.clear();
        buffer.put_slice(payload);
        buffer.flip();
        slot.buffer = Some(buffer);
        slot.sample = MediaSample { offset: 0, ..sample };
        slot.state = SlotState::Queued;
        self.queued.push_back(tag);
        Ok(())
    }

    pub(crate) fn dequeue_output(&mut self) -> Result<Dequeued> {
        self.ensure_not_released()?;
        let Some(tag) = self.queued.pop_front() else {
            return Ok(Dequeued::TryAgainLater);
        };
        if let Some(slot) = self.slot_mut(tag) {
            slot.state = SlotState::DequeuedOutput;
        }
        Ok(Dequeued::Frame(FrameTag::new(tag)))
    }

    pub(crate) fn output_frame(&mut self, tag: &FrameTag) -> Option<Frame> {
        let slot = self.slot_mut(tag.index())?;
        if slot.state != SlotState::DequeuedOutput {
            return None;
        }
        let buffer = slot.buffer.take()?;
        Some(Frame::new(tag.index(), buffer, slot.sample))
    }

    pub(crate) fn release_output(&mut self, frame: Frame) -> Result<()> {
        if self.released {
            // Frames still held by the caller simply go away after release.
            return Ok(());
        }
        let codec = self.codec;
        let (tag, mut buffer, _) = frame.into_parts();
        let slot = self
            .slot_mut(tag)
            .filter(|slot| slot.state == SlotState::DequeuedOutput && slot.buffer.is_none())
            .ok_or_else(|| MediaKitError::Codec(format!("{codec}: frame {tag} was not dequeued for output")))?;
        buffer.clear();
        slot.buffer = Some(buffer);
        slot.sample = MediaSample::default();
        slot.state = SlotState::Free;
        self.available.push_back(tag);
        Ok(())
    }

    pub(crate) const fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn release(&mut self) {
        self.released = true;
        self.available.clear();
        self.queued.clear();
        self.slots.clear();
    }

    #[cfg(test)]
    pub(crate) fn available_count(&self) -> usize {
        self.available.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mediakit_core::BufferFlags;

    fn dequeue_tag(result: Dequeued) -> FrameTag {
        match result {
            Dequeued::Frame(tag) => tag,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn frames_cannot_be_resolved_twice() {
        let mut arena = FrameArena::new("test", 1, 4);
        let tag = dequeue_tag(arena.dequeue_input().unwrap());
        let frame = arena.input_frame(&tag);
        assert!(frame.is_some());
        assert!(arena.input_frame(&tag).is_none());
    }

    #[test]
    fn queue_rejects_foreign_frames() {
        let mut arena = FrameArena::new("test", 1, 4);
        let stray = Frame::new(0, ByteBuffer::allocate(4), MediaSample::default());
        assert!(arena.queue_input(stray).is_err());
    }

    #[test]
    fn internal_frames_grow_the_arena_when_full() {
        let mut arena = FrameArena::new("test", 1, 4);
        arena.queue_internal(&[1, 2], MediaSample::new(0, 2, 10, BufferFlags::empty())).unwrap();
        arena.queue_internal(&[3; 8], MediaSample::new(0, 8, 20, BufferFlags::SYNC)).unwrap();

        let first = dequeue_tag(arena.dequeue_output().unwrap());
        let frame = arena.output_frame(&first).unwrap();
        assert_eq!(frame.payload(), &[1, 2]);
        let second = dequeue_tag(arena.dequeue_output().unwrap());
        let frame = arena.output_frame(&second).unwrap();
        assert_eq!(frame.payload(), &[3; 8]);
        assert_eq!(frame.sample.presentation_time_us, 20);
    }

    #[test]
    fn released_arena_refuses_work() {
        let mut arena = FrameArena::new("test", 2, 4);
        arena.release();
        arena.release();
        assert!(arena.dequeue_input().is_err());
        assert!(arena.dequeue_output().is_err());
        assert_eq!(arena.available_count(), 0);
    }
}
