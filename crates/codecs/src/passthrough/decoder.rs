// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A decoder that hands its input straight back as output.

use super::arena::FrameArena;
use super::DEFAULT_POOL_SIZE;
use bytes::Bytes;
use mediakit_core::{
    Decoder, Dequeued, Frame, FrameTag, Image, MediaFormat, MediaKitError, Result, SurfaceTexture,
};
use std::time::Duration;

const NAME: &str = "PassthroughDecoder";

/// Frames queued for input come out unchanged, in order, with their sample metadata.
///
/// The decoder never blocks: dequeue calls return `TryAgainLater` immediately when no slot
/// is ready, whatever the timeout. The output format is the init format, so
/// `OutputFormatChanged` is never emitted.
pub struct PassthroughDecoder {
    arena: FrameArena,
    format: Option<MediaFormat>,
    surface: Option<SurfaceTexture>,
    running: bool,
}

impl PassthroughDecoder {
    /// Create a decoder whose input buffers hold `buffer_capacity` bytes.
    pub fn new(buffer_capacity: usize) -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE, buffer_capacity)
    }

    pub fn with_pool_size(pool_size: usize, buffer_capacity: usize) -> Self {
        Self {
            arena: FrameArena::new(NAME, pool_size, buffer_capacity),
            format: None,
            surface: None,
            running: false,
        }
    }

    fn render(&self, frame: &Frame) {
        let Some(surface) = &self.surface else { return };
        let format = self.format.as_ref();
        surface.post(Image {
            data: Bytes::copy_from_slice(frame.payload()),
            width: format.and_then(MediaFormat::width).unwrap_or(0),
            height: format.and_then(MediaFormat::height).unwrap_or(0),
            presentation_time_us: frame.sample.presentation_time_us,
        });
    }
}

impl Decoder for PassthroughDecoder {
    fn init(&mut self, format: &MediaFormat, surface: Option<SurfaceTexture>) -> Result<()> {
        if self.arena.is_released() {
            return Err(MediaKitError::Codec(format!("{NAME} was released")));
        }
        self.format = Some(format.clone());
        self.surface = surface;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.format.is_none() {
            return Err(MediaKitError::Codec(format!("{NAME} started before init")));
        }
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn dequeue_input_frame(&mut self, _timeout: Duration) -> Result<Dequeued> {
        self.arena.dequeue_input()
    }

    fn get_input_frame(&mut self, tag: FrameTag) -> Option<Frame> {
        self.arena.input_frame(&tag)
    }

    fn queue_input_frame(&mut self, frame: Frame) -> Result<()> {
        self.arena.queue_input(frame)
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<Dequeued> {
        self.arena.dequeue_output()
    }

    fn get_output_frame(&mut self, tag: FrameTag) -> Option<Frame> {
        self.arena.output_frame(&tag)
    }

    fn release_output_frame(&mut self, frame: Frame, render: bool) -> Result<()> {
        if render {
            self.render(&frame);
        }
        self.arena.release_output(frame)
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.format.clone()
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {
        self.arena.release();
    }

    fn name(&self) -> &str {
        NAME
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mediakit_core::{mime, BufferFlags};

    fn started(pool: usize) -> PassthroughDecoder {
        let mut decoder = PassthroughDecoder::with_pool_size(pool, 16);
        decoder.init(&MediaFormat::video(mime::VIDEO_RAW, 2, 1), None).unwrap();
        decoder.start().unwrap();
        decoder
    }

    fn tag(result: Dequeued) -> FrameTag {
        match result {
            Dequeued::Frame(tag) => tag,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    fn feed(decoder: &mut PassthroughDecoder, payload: &[u8], pt: i64) {
        let input = tag(decoder.dequeue_input_frame(Duration::ZERO).unwrap());
        let mut frame = decoder.get_input_frame(input).unwrap();
        frame.buffer.put_slice(payload);
        frame.sample.set(0, u32::try_from(payload.len()).unwrap(), pt, BufferFlags::SYNC);
        decoder.queue_input_frame(frame).unwrap();
    }

    #[test]
    fn pool_is_conserved() {
        let mut decoder = started(2);
        let first = tag(decoder.dequeue_input_frame(Duration::ZERO).unwrap());
        let _second = tag(decoder.dequeue_input_frame(Duration::ZERO).unwrap());
        assert_eq!(decoder.dequeue_input_frame(Duration::ZERO).unwrap(), Dequeued::TryAgainLater);

        let frame = decoder.get_input_frame(first).unwrap();
        decoder.queue_input_frame(frame).unwrap();
        let out = tag(decoder.dequeue_output_frame(Duration::ZERO).unwrap());
        let frame = decoder.get_output_frame(out).unwrap();
        decoder.release_output_frame(frame, false).unwrap();

        assert!(matches!(decoder.dequeue_input_frame(Duration::ZERO).unwrap(), Dequeued::Frame(_)));
        assert_eq!(decoder.dequeue_input_frame(Duration::ZERO).unwrap(), Dequeued::TryAgainLater);
    }

    #[test]
    fn output_preserves_order_and_metadata() {
        let mut decoder = started(2);
        feed(&mut decoder, &[1, 2, 3], 100);
        feed(&mut decoder, &[4, 5], 200);

        for (payload, pt) in [(&[1u8, 2, 3][..], 100), (&[4u8, 5][..], 200)] {
            let out = tag(decoder.dequeue_output_frame(Duration::ZERO).unwrap());
            let frame = decoder.get_output_frame(out).unwrap();
            assert_eq!(frame.payload(), payload);
            assert_eq!(frame.sample.presentation_time_us, pt);
            assert!(frame.sample.flags.contains(BufferFlags::SYNC));
            decoder.release_output_frame(frame, false).unwrap();
        }
        assert_eq!(decoder.dequeue_output_frame(Duration::ZERO).unwrap(), Dequeued::TryAgainLater);
    }

    #[test]
    fn rendered_frames_reach_the_surface() {
        let surface = SurfaceTexture::new();
        let mut decoder = PassthroughDecoder::new(16);
        decoder.init(&MediaFormat::video(mime::VIDEO_RAW, 2, 1), Some(surface.clone())).unwrap();
        decoder.start().unwrap();
        feed(&mut decoder, &[9, 9, 9, 9, 9, 9], 42);

        let out = tag(decoder.dequeue_output_frame(Duration::ZERO).unwrap());
        let frame = decoder.get_output_frame(out).unwrap();
        decoder.release_output_frame(frame, true).unwrap();

        let image = surface.await_new_image(Duration::from_millis(10)).unwrap();
        assert_eq!((image.width, image.height, image.presentation_time_us), (2, 1, 42));
        assert_eq!(&image.data[..], &[9; 6]);
    }

    #[test]
    fn discarded_frames_do_not_render() {
        let surface = SurfaceTexture::new();
        let mut decoder = PassthroughDecoder::new(16);
        decoder.init(&MediaFormat::video(mime::VIDEO_RAW, 2, 1), Some(surface.clone())).unwrap();
        feed(&mut decoder, &[1], 0);
        let out = tag(decoder.dequeue_output_frame(Duration::ZERO).unwrap());
        let frame = decoder.get_output_frame(out).unwrap();
        decoder.release_output_frame(frame, false).unwrap();
        assert!(!surface.has_pending_image());
    }

    #[test]
    fn release_is_idempotent() {
        let mut decoder = started(2);
        decoder.release();
        decoder.release();
        // Running follows start and stop only.
        assert!(decoder.is_running());
        assert!(decoder.dequeue_input_frame(Duration::ZERO).is_err());
        assert!(decoder.init(&MediaFormat::raw_audio(8_000, 1), None).is_err());
        decoder.stop();
        assert!(!decoder.is_running());
    }
}
