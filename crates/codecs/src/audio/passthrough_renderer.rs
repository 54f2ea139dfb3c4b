// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use mediakit_core::{
    lock_encoder, BufferFlags, Dequeued, Frame, InputSurface, MediaFormat, RenderMode, Renderer,
    Result, SharedEncoder, SurfaceTexture,
};
use std::time::Duration;

/// How long to wait for each encoder input buffer before dropping the frame.
pub const FRAME_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Copies decoded buffers into encoder input buffers on the calling thread, without any
/// format conversion.
///
/// A frame larger than one encoder buffer is spread over as many buffers as it needs; the
/// fragments are queued together once the whole frame has been copied, and only the last one
/// keeps the end-of-stream flag.
pub struct PassthroughSoftwareRenderer {
    encoder: SharedEncoder,
    frame_wait_timeout: Duration,
}

impl PassthroughSoftwareRenderer {
    pub fn new(encoder: SharedEncoder) -> Self {
        Self { encoder, frame_wait_timeout: FRAME_WAIT_TIMEOUT }
    }

    #[must_use]
    pub const fn with_frame_wait_timeout(mut self, timeout: Duration) -> Self {
        self.frame_wait_timeout = timeout;
        self
    }
}

impl Renderer for PassthroughSoftwareRenderer {
    fn mode(&self) -> RenderMode {
        RenderMode::Buffer
    }

    fn init(
        &mut self,
        _output_surface: Option<Box<dyn InputSurface>>,
        _source: Option<&MediaFormat>,
        _target: Option<&MediaFormat>,
    ) -> Result<()> {
        Ok(())
    }

    fn on_media_format_changed(
        &mut self,
        _source: Option<&MediaFormat>,
        _target: Option<&MediaFormat>,
    ) -> Result<()> {
        Ok(())
    }

    fn input_surface(&self) -> Option<SurfaceTexture> {
        None
    }

    fn render_frame(&mut self, frame: Option<&Frame>, presentation_time_ns: i64) -> Result<()> {
        let Some(frame) = frame else {
            tracing::error!("No input frame provided");
            return Ok(());
        };

        let payload = frame.payload();
        let presentation_time_us = presentation_time_ns / 1000;
        let mut encoder = lock_encoder(&self.encoder)?;
        let mut fragments = Vec::new();
        let mut copied = 0;

        loop {
            let tag = match encoder.dequeue_input_frame(self.frame_wait_timeout)? {
                Dequeued::Frame(tag) => tag,
                Dequeued::TryAgainLater => {
                    tracing::error!("Encoder input frame timeout, dropping a frame");
                    break;
                },
                Dequeued::OutputFormatChanged => {
                    tracing::error!("Unexpected format change on encoder input, dropping a frame");
                    break;
                },
            };
            let Some(mut fragment) = encoder.get_input_frame(tag) else {
                tracing::error!("No input frame returned by {}, dropping a frame", encoder.name());
                break;
            };

            fragment.buffer.clear();
            let size = fragment.buffer.put_slice(&payload[copied..]);
            copied += size;
            let flags = if copied < payload.len() {
                frame.sample.flags.difference(BufferFlags::END_OF_STREAM)
            } else {
                frame.sample.flags
            };
            fragment.sample.set(0, u32::try_from(size).unwrap_or(u32::MAX), presentation_time_us, flags);
            fragments.push(fragment);

            if copied >= payload.len() || size == 0 {
                break;
            }
        }

        for fragment in fragments {
            encoder.queue_input_frame(fragment)?;
        }
        Ok(())
    }

    fn release(&mut self) {}

    fn has_filters(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingEncoder;
    use mediakit_core::{shared_encoder, ByteBuffer, MediaSample};

    fn frame(size: usize, flags: BufferFlags) -> Frame {
        #[allow(clippy::cast_possible_truncation)]
        let bytes: Vec<u8> = (0..size).map(|i| i as u8).collect();
        Frame::new(0, ByteBuffer::wrap(bytes), MediaSample::new(0, u32::try_from(size).unwrap(), 0, flags))
    }

    #[test]
    fn large_frames_are_spread_over_encoder_buffers() {
        let encoder = RecordingEncoder::new(4);
        let mut renderer = PassthroughSoftwareRenderer::new(shared_encoder(encoder.clone()));
        renderer.render_frame(Some(&frame(10, BufferFlags::END_OF_STREAM)), 5_000).unwrap();

        let submitted = encoder.submissions().snapshot();
        let sizes: Vec<u32> = submitted.iter().map(|s| s.sample.size).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(submitted.iter().all(|s| s.sample.presentation_time_us == 5));
        assert!(!submitted[0].sample.is_end_of_stream());
        assert!(submitted[2].sample.is_end_of_stream());
        let joined: Vec<u8> = submitted.iter().flat_map(|s| s.payload.clone()).collect();
        assert_eq!(joined, (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn exhausted_encoder_drops_the_rest_of_the_frame() {
        let encoder = RecordingEncoder::new(4).with_input_budget(1);
        let mut renderer = PassthroughSoftwareRenderer::new(shared_encoder(encoder.clone()))
            .with_frame_wait_timeout(Duration::ZERO);
        renderer.render_frame(Some(&frame(10, BufferFlags::empty())), 0).unwrap();
        assert_eq!(encoder.submissions().len(), 1);
    }

    #[test]
    fn empty_end_of_stream_frame_is_forwarded() {
        let encoder = RecordingEncoder::new(4);
        let mut renderer = PassthroughSoftwareRenderer::new(shared_encoder(encoder.clone()));
        renderer.render_frame(Some(&frame(0, BufferFlags::END_OF_STREAM)), 0).unwrap();
        let submitted = encoder.submissions().snapshot();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].sample.is_end_of_stream());
    }
}
