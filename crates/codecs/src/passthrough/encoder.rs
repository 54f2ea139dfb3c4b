// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! An encoder that emits its input unchanged.
//!
//! Fed either through input frames (buffer mode) or through the input surface it creates
//! (surface mode); in surface mode each `swap_buffers` becomes one output frame.

use super::arena::FrameArena;
use super::DEFAULT_POOL_SIZE;
use mediakit_core::{
    BufferFlags, Dequeued, Encoder, Frame, FrameTag, InputSurface, MediaFormat, MediaKitError,
    MediaSample, Result,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const NAME: &str = "PassthroughEncoder";

struct EncoderState {
    arena: FrameArena,
    format: Option<MediaFormat>,
    format_reported: bool,
}

type SharedState = Arc<Mutex<EncoderState>>;

fn lock(state: &SharedState) -> Result<MutexGuard<'_, EncoderState>> {
    state.lock().map_err(|_| MediaKitError::Codec(format!("{NAME} state lock poisoned")))
}

/// Emits `OutputFormatChanged` once, on the first output dequeue, then every queued frame
/// in order. Never blocks: timeouts are accepted and ignored.
pub struct PassthroughEncoder {
    state: SharedState,
    running: bool,
}

impl PassthroughEncoder {
    pub fn new(buffer_capacity: usize) -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE, buffer_capacity)
    }

    pub fn with_pool_size(pool_size: usize, buffer_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(EncoderState {
                arena: FrameArena::new(NAME, pool_size, buffer_capacity),
                format: None,
                format_reported: false,
            })),
            running: false,
        }
    }
}

impl Encoder for PassthroughEncoder {
    fn init(&mut self, format: &MediaFormat) -> Result<()> {
        let mut state = lock(&self.state)?;
        if state.arena.is_released() {
            return Err(MediaKitError::Codec(format!("{NAME} was released")));
        }
        state.format = Some(format.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> Option<Box<dyn InputSurface>> {
        Some(Box::new(PassthroughInputSurface {
            state: Arc::clone(&self.state),
            presentation_time_ns: 0,
            released: false,
        }))
    }

    fn start(&mut self) -> Result<()> {
        if lock(&self.state)?.format.is_none() {
            return Err(MediaKitError::Codec(format!("{NAME} started before init")));
        }
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn dequeue_input_frame(&mut self, _timeout: Duration) -> Result<Dequeued> {
        lock(&self.state)?.arena.dequeue_input()
    }

    fn get_input_frame(&mut self, tag: FrameTag) -> Option<Frame> {
        lock(&self.state).ok()?.arena.input_frame(&tag)
    }

    fn queue_input_frame(&mut self, frame: Frame) -> Result<()> {
        lock(&self.state)?.arena.queue_input(frame)
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        lock(&self.state)?.arena.queue_internal(&[], MediaSample::end_of_stream())
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<Dequeued> {
        let mut state = lock(&self.state)?;
        if !state.format_reported && state.format.is_some() && !state.arena.is_released() {
            state.format_reported = true;
            return Ok(Dequeued::OutputFormatChanged);
        }
        state.arena.dequeue_output()
    }

    fn get_output_frame(&mut self, tag: FrameTag) -> Option<Frame> {
        lock(&self.state).ok()?.arena.output_frame(&tag)
    }

    fn release_output_frame(&mut self, frame: Frame) -> Result<()> {
        lock(&self.state)?.arena.release_output(frame)
    }

    fn output_format(&self) -> Option<MediaFormat> {
        lock(&self.state).ok()?.format.clone()
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {
        if let Ok(mut state) = lock(&self.state) {
            state.arena.release();
        }
    }

    fn name(&self) -> &str {
        NAME
    }
}

/// Drawable handed to a renderer; each swap queues one encoder output frame.
struct PassthroughInputSurface {
    state: SharedState,
    presentation_time_ns: i64,
    released: bool,
}

impl InputSurface for PassthroughInputSurface {
    fn set_presentation_time(&mut self, presentation_time_ns: i64) {
        self.presentation_time_ns = presentation_time_ns;
    }

    fn swap_buffers(&mut self, back_buffer: &[u8]) -> Result<()> {
        if self.released {
            return Err(MediaKitError::Render("input surface released".to_string()));
        }
        let size = u32::try_from(back_buffer.len())
            .map_err(|_| MediaKitError::Render("frame too large for input surface".to_string()))?;
        let sample = MediaSample::new(0, size, self.presentation_time_ns / 1000, BufferFlags::SYNC);
        lock(&self.state)?.arena.queue_internal(back_buffer, sample)
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mediakit_core::{mime, TranscoderError};

    fn started(pool: usize) -> PassthroughEncoder {
        let mut encoder = PassthroughEncoder::with_pool_size(pool, 8);
        encoder.init(&MediaFormat::raw_audio(48_000, 2)).unwrap();
        encoder.start().unwrap();
        encoder
    }

    fn tag(result: Dequeued) -> FrameTag {
        match result {
            Dequeued::Frame(tag) => tag,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn format_change_precedes_data_exactly_once() {
        let mut encoder = started(2);
        assert_eq!(encoder.dequeue_output_frame(Duration::ZERO).unwrap(), Dequeued::OutputFormatChanged);
        assert_eq!(encoder.output_format().and_then(|f| f.sample_rate()), Some(48_000));
        assert_eq!(encoder.dequeue_output_frame(Duration::ZERO).unwrap(), Dequeued::TryAgainLater);
        assert_eq!(encoder.dequeue_output_frame(Duration::ZERO).unwrap(), Dequeued::TryAgainLater);
    }

    #[test]
    fn releasing_output_frees_exactly_one_input() {
        let mut encoder = started(2);
        let a = tag(encoder.dequeue_input_frame(Duration::ZERO).unwrap());
        let b = tag(encoder.dequeue_input_frame(Duration::ZERO).unwrap());
        assert_eq!(encoder.dequeue_input_frame(Duration::ZERO).unwrap(), Dequeued::TryAgainLater);

        for (input, byte) in [(a, 1u8), (b, 2u8)] {
            let mut frame = encoder.get_input_frame(input).unwrap();
            frame.buffer.put_slice(&[byte; 4]);
            frame.sample.set(0, 4, i64::from(byte), BufferFlags::empty());
            encoder.queue_input_frame(frame).unwrap();
        }

        assert_eq!(encoder.dequeue_output_frame(Duration::ZERO).unwrap(), Dequeued::OutputFormatChanged);
        let out = tag(encoder.dequeue_output_frame(Duration::ZERO).unwrap());
        let frame = encoder.get_output_frame(out).unwrap();
        assert_eq!(frame.payload(), &[1; 4]);
        encoder.release_output_frame(frame).unwrap();

        assert!(matches!(encoder.dequeue_input_frame(Duration::ZERO).unwrap(), Dequeued::Frame(_)));
        assert_eq!(encoder.dequeue_input_frame(Duration::ZERO).unwrap(), Dequeued::TryAgainLater);

        let out = tag(encoder.dequeue_output_frame(Duration::ZERO).unwrap());
        assert_eq!(encoder.get_output_frame(out).unwrap().payload(), &[2; 4]);
    }

    #[test]
    fn surface_swaps_become_output_frames() {
        let mut encoder = PassthroughEncoder::new(4);
        encoder.init(&MediaFormat::video(mime::VIDEO_RAW, 2, 2)).unwrap();
        let mut surface = encoder.create_input_surface().unwrap();
        encoder.start().unwrap();

        surface.set_presentation_time(33_000_000);
        surface.swap_buffers(&[7; 16]).unwrap();
        encoder.signal_end_of_input_stream().unwrap();

        assert_eq!(encoder.dequeue_output_frame(Duration::ZERO).unwrap(), Dequeued::OutputFormatChanged);
        let out = tag(encoder.dequeue_output_frame(Duration::ZERO).unwrap());
        let frame = encoder.get_output_frame(out).unwrap();
        assert_eq!(frame.payload(), &[7; 16]);
        assert_eq!(frame.sample.presentation_time_us, 33_000);
        encoder.release_output_frame(frame).unwrap();

        let out = tag(encoder.dequeue_output_frame(Duration::ZERO).unwrap());
        assert!(encoder.get_output_frame(out).unwrap().sample.is_end_of_stream());

        surface.release();
        assert!(surface.swap_buffers(&[0]).is_err());
    }

    #[test]
    fn release_is_idempotent() {
        let mut encoder = started(2);
        encoder.release();
        encoder.release();
        assert!(encoder.is_running());
        let err = encoder.dequeue_input_frame(Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            MediaKitError::Transcoder(TranscoderError::CodecInReleasedState { .. })
        ));
        encoder.stop();
        assert!(!encoder.is_running());
    }
}
