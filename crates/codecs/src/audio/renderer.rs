// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Buffer-based audio renderer.
//!
//! `render_frame` converts each decoded frame to the target layout and queues it. A consumer
//! thread owned by the renderer drains that queue into encoder input buffers, splitting a frame
//! across several encoder buffers when it does not fit in one:
//!
//! ```text
//! pipeline thread                         consumer thread
//! ───────────────                         ───────────────
//! render_frame ─► processor ─► filters ─► [render queue] ─► encoder.dequeue_input_frame
//!                                                           copy min(capacity, remaining)
//!                                                           encoder.queue_input_frame
//! ```
//!
//! The pipeline pace and the encoder's input availability are decoupled by the queue; the
//! consumer sleeps briefly when the encoder has no free input buffer.

use super::processor::{create_processor, AudioParams, AudioProcessor, ResamplerConfig};
use mediakit_core::{
    lock_encoder, pcm, BufferFilter, BufferFlags, BufferPool, ByteBuffer, Dequeued, Frame,
    InputSurface, MediaFormat, MediaKitError, MediaSample, RenderMode, Renderer, Result,
    SharedEncoder, SurfaceTexture, TranscoderError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long the consumer backs off when the encoder has no free input buffer.
const ENCODER_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A rendered frame waiting for encoder input buffers.
struct QueuedFrame {
    buffer: ByteBuffer,
    /// `size` is the full rendered size; `presentation_time_us` is the base time.
    sample: MediaSample,
    /// Bytes already handed to the encoder.
    consumed: usize,
    frame_bytes: usize,
    sample_duration_us: f64,
}

impl QueuedFrame {
    const fn remaining(&self) -> usize {
        self.sample.size as usize - self.consumed
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn presentation_time_us(&self) -> i64 {
        let consumed_samples = self.consumed / self.frame_bytes;
        self.sample.presentation_time_us
            + (consumed_samples as f64 * self.sample_duration_us) as i64
    }
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<QueuedFrame>,
    released: bool,
    /// First error hit by the consumer, reported by the next `check_health` or `render_frame`.
    failure: Option<MediaKitError>,
}

#[derive(Default)]
struct RenderQueue {
    state: Mutex<QueueState>,
    frame_ready: Condvar,
}

impl RenderQueue {
    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state.lock().map_err(|_| MediaKitError::Runtime("render queue lock poisoned".to_string()))
    }
}

/// Renders decoded 16-bit PCM into an encoder's input buffers.
pub struct AudioRenderer {
    encoder: SharedEncoder,
    filters: Vec<Box<dyn BufferFilter>>,
    pool: Arc<BufferPool>,
    resampler_config: ResamplerConfig,
    queue: Arc<RenderQueue>,
    consumer: Option<JoinHandle<()>>,
    processor: Option<Box<dyn AudioProcessor>>,
    params: Option<AudioParams>,
    sample_duration_us: f64,
    /// Output clock, advanced by the duration of every rendered frame.
    presentation_time_us: i64,
    released: bool,
}

impl AudioRenderer {
    pub fn new(encoder: SharedEncoder) -> Self {
        Self {
            encoder,
            filters: Vec::new(),
            pool: Arc::new(BufferPool::default()),
            resampler_config: ResamplerConfig::default(),
            queue: Arc::new(RenderQueue::default()),
            consumer: None,
            processor: None,
            params: None,
            sample_duration_us: 0.0,
            presentation_time_us: 0,
            released: false,
        }
    }

    /// Buffer filters applied in list order to every rendered frame.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<Box<dyn BufferFilter>>) -> Self {
        self.filters = filters;
        self
    }

    /// Share a buffer pool, e.g. between renderers with identical configuration.
    #[must_use]
    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_resampler_config(mut self, config: ResamplerConfig) -> Self {
        self.resampler_config = config;
        self
    }

    /// Rendered frames not yet fully handed to the encoder.
    pub fn pending_frames(&self) -> usize {
        self.queue.lock().map_or(0, |state| state.frames.len())
    }

    fn spawn_consumer(&mut self) -> Result<()> {
        if self.consumer.is_some() {
            return Ok(());
        }
        let queue = Arc::clone(&self.queue);
        let encoder = Arc::clone(&self.encoder);
        let pool = Arc::clone(&self.pool);
        let handle = std::thread::Builder::new()
            .name("audio-render".to_string())
            .spawn(move || run_consumer(&queue, &encoder, &pool))
            .map_err(|e| MediaKitError::Runtime(format!("Failed to spawn audio render thread: {e}")))?;
        self.consumer = Some(handle);
        Ok(())
    }
}

impl Renderer for AudioRenderer {
    fn mode(&self) -> RenderMode {
        RenderMode::Buffer
    }

    fn init(
        &mut self,
        _output_surface: Option<Box<dyn InputSurface>>,
        source: Option<&MediaFormat>,
        target: Option<&MediaFormat>,
    ) -> Result<()> {
        if self.released {
            return Err(MediaKitError::Render("audio renderer was released".to_string()));
        }
        let (Some(source), Some(target)) = (source, target) else {
            return Err(MediaKitError::Configuration(
                "audio renderer needs both source and target formats".to_string(),
            ));
        };
        self.on_media_format_changed(Some(source), Some(target))?;
        for filter in &mut self.filters {
            filter.init(target)?;
        }
        self.presentation_time_us = 0;
        self.spawn_consumer()?;
        tracing::debug!(source = %source, target = %target, "Audio renderer initialised");
        Ok(())
    }

    fn on_media_format_changed(
        &mut self,
        source: Option<&MediaFormat>,
        target: Option<&MediaFormat>,
    ) -> Result<()> {
        let (Some(source), Some(target)) = (source, target) else {
            return Ok(());
        };
        let params = AudioParams::from_formats(source, target)?;
        if self.params == Some(params) && self.processor.is_some() {
            return Ok(());
        }

        if let Some(mut previous) = self.processor.take() {
            previous.release();
            tracing::debug!("Audio format changed, rebuilding processor");
        }
        self.processor = Some(create_processor(params, &self.resampler_config)?);
        self.params = Some(params);
        self.sample_duration_us = pcm::sample_duration_us(params.target_sample_rate);
        Ok(())
    }

    fn input_surface(&self) -> Option<SurfaceTexture> {
        None
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn render_frame(&mut self, frame: Option<&Frame>, _presentation_time_ns: i64) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.check_health()?;
        let Some(frame) = frame else {
            return Ok(());
        };
        let (Some(processor), Some(params)) = (self.processor.as_mut(), self.params) else {
            return Err(MediaKitError::Render("audio renderer not initialised".to_string()));
        };

        let input = frame.payload();
        let source_frames = input.len() / params.source_frame_bytes();
        let frame_bytes = params.target_frame_bytes();
        let estimated_bytes = params.estimated_target_frames(source_frames) * frame_bytes;

        let mut buffer = self.pool.get(estimated_bytes);
        let target_frames = processor.process(input, &mut buffer.storage_mut()[..estimated_bytes])?;
        let size = u32::try_from(target_frames * frame_bytes)
            .map_err(|_| MediaKitError::Render("rendered audio frame too large".to_string()))?;

        let sample = MediaSample::new(0, size, self.presentation_time_us, frame.sample.flags);
        self.presentation_time_us += (target_frames as f64 * self.sample_duration_us) as i64;

        let mut rendered = Frame::new(frame.tag(), buffer, sample);
        for filter in &mut self.filters {
            filter.apply(&mut rendered);
        }
        let (_, buffer, sample) = rendered.into_parts();

        let mut state = self.queue.lock()?;
        state.frames.push_back(QueuedFrame {
            buffer,
            sample,
            consumed: 0,
            frame_bytes,
            sample_duration_us: self.sample_duration_us,
        });
        drop(state);
        self.queue.frame_ready.notify_one();
        Ok(())
    }

    fn check_health(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        match self.queue.lock()?.failure.take() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Ok(mut state) = self.queue.lock() {
            state.released = true;
        }
        self.queue.frame_ready.notify_all();
        if let Some(handle) = self.consumer.take() {
            if handle.join().is_err() {
                tracing::warn!("Audio render thread panicked");
            }
        }
        if let Ok(mut state) = self.queue.lock() {
            state.frames.clear();
        }

        if let Some(mut processor) = self.processor.take() {
            processor.release();
        }
        for filter in &mut self.filters {
            filter.release();
        }
        self.pool.clear();
        tracing::debug!("Audio renderer released");
    }

    fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_consumer(queue: &RenderQueue, encoder: &SharedEncoder, pool: &BufferPool) {
    loop {
        let Ok(state) = queue.lock() else { return };
        let Ok(mut state) =
            queue.frame_ready.wait_while(state, |s| s.frames.is_empty() && !s.released)
        else {
            return;
        };
        if state.released {
            return;
        }

        match feed_encoder(&mut state, encoder, pool) {
            Ok(true) => {},
            Ok(false) => {
                drop(state);
                std::thread::sleep(ENCODER_POLL_INTERVAL);
            },
            Err(e) => {
                tracing::error!(error = %e, "Audio render thread failed to feed the encoder");
                state.frames.clear();
                state.failure = Some(e);
                return;
            },
        }
    }
}

/// Move the head of the queue into one encoder input buffer.
///
/// Returns `Ok(false)` when the encoder has no free input buffer.
fn feed_encoder(state: &mut QueueState, encoder: &SharedEncoder, pool: &BufferPool) -> Result<bool> {
    let Some(head) = state.frames.front_mut() else {
        return Ok(true);
    };

    let mut encoder = lock_encoder(encoder)?;
    let tag = match encoder.dequeue_input_frame(Duration::ZERO)? {
        Dequeued::Frame(tag) => tag,
        Dequeued::TryAgainLater => return Ok(false),
        Dequeued::OutputFormatChanged => {
            tracing::warn!("Unexpected format change on encoder input");
            return Ok(false);
        },
    };
    let mut input = encoder.get_input_frame(tag).ok_or(TranscoderError::NoFrameAvailable)?;

    let capacity = input.buffer.capacity();
    let remaining = head.remaining();
    if capacity == 0 && remaining > 0 {
        return Err(MediaKitError::Codec(format!("{} offered an empty input buffer", encoder.name())));
    }

    let presentation_time_us = head.presentation_time_us();
    let (size, flags, finished) = if capacity >= remaining {
        (remaining, head.sample.flags, true)
    } else {
        (capacity, head.sample.flags.difference(BufferFlags::END_OF_STREAM), false)
    };

    input.buffer.clear();
    input.buffer.put_slice(head.buffer.region(head.consumed, size));
    input.sample.set(0, u32::try_from(size).unwrap_or(u32::MAX), presentation_time_us, flags);
    head.consumed += size;
    encoder.queue_input_frame(input)?;
    drop(encoder);

    if finished {
        if let Some(done) = state.frames.pop_front() {
            pool.put(done.buffer);
        }
    }
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::audio::filters::{VolumeFilter, VolumeFilterConfig};
    use crate::test_utils::{wait_until, EncoderFault, FaultyEncoder, RecordingEncoder};
    use mediakit_core::{keys, shared_encoder};

    const WAIT: Duration = Duration::from_secs(5);

    fn input_frame(size: usize, pt: i64, flags: BufferFlags) -> Frame {
        #[allow(clippy::cast_possible_truncation)]
        let bytes: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let sample = MediaSample::new(0, u32::try_from(size).unwrap(), pt, flags);
        Frame::new(0, ByteBuffer::wrap(bytes), sample)
    }

    fn renderer_with(
        encoder: &RecordingEncoder,
        channels: u32,
        rate: u32,
    ) -> AudioRenderer {
        let mut renderer = AudioRenderer::new(shared_encoder(encoder.clone()));
        let format = MediaFormat::raw_audio(rate, channels);
        renderer.init(None, Some(&format), Some(&format)).unwrap();
        renderer
    }

    #[test]
    fn frame_that_fits_is_copied_whole() {
        let encoder = RecordingEncoder::new(42);
        let mut renderer = renderer_with(&encoder, 2, 44_100);

        let frame = input_frame(40, 100, BufferFlags::empty());
        renderer.render_frame(Some(&frame), 100_000).unwrap();

        let submitted = encoder.submissions().wait_for(1, WAIT);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].payload, frame.payload());
        assert_eq!(submitted[0].sample.size, 40);
        assert_eq!(submitted[0].sample.presentation_time_us, 0);
        renderer.release();
    }

    #[test]
    fn oversized_frame_is_split_across_encoder_buffers() {
        let encoder = RecordingEncoder::new(42);
        let mut renderer = renderer_with(&encoder, 2, 44_100);

        let frame = input_frame(52, 100, BufferFlags::END_OF_STREAM);
        renderer.render_frame(Some(&frame), 100_000).unwrap();

        let submitted = encoder.submissions().wait_for(2, WAIT);
        assert_eq!(submitted.len(), 2);

        let (first, second) = (&submitted[0], &submitted[1]);
        assert_eq!(first.sample.size, 42);
        assert!(!first.sample.flags.contains(BufferFlags::END_OF_STREAM));
        assert_eq!(first.payload, &frame.payload()[..42]);

        assert_eq!(second.sample.size, 10);
        assert!(second.sample.flags.contains(BufferFlags::END_OF_STREAM));
        assert_eq!(second.payload, &frame.payload()[42..]);

        // 42 bytes of stereo s16 = 10 whole samples at 44.1kHz.
        #[allow(clippy::cast_possible_truncation)]
        let offset = (10.0 * pcm::sample_duration_us(44_100)) as i64;
        assert_eq!(
            second.sample.presentation_time_us - first.sample.presentation_time_us,
            offset
        );
        renderer.release();
    }

    #[test]
    fn presentation_time_follows_rendered_sample_count() {
        let encoder = RecordingEncoder::new(1024);
        let mut renderer = renderer_with(&encoder, 1, 8_000);

        // 80 mono samples at 8kHz = 10ms each.
        for pt in [0, 123_456, 7] {
            renderer.render_frame(Some(&input_frame(160, pt, BufferFlags::empty())), 0).unwrap();
        }
        let submitted = encoder.submissions().wait_for(3, WAIT);
        let times: Vec<i64> = submitted.iter().map(|s| s.sample.presentation_time_us).collect();
        assert_eq!(times, vec![0, 10_000, 20_000]);
        renderer.release();
    }

    #[test]
    fn end_of_stream_marker_is_forwarded() {
        let encoder = RecordingEncoder::new(16);
        let mut renderer = renderer_with(&encoder, 2, 48_000);
        renderer.render_frame(Some(&input_frame(0, -1, BufferFlags::END_OF_STREAM)), 0).unwrap();

        let submitted = encoder.submissions().wait_for(1, WAIT);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].sample.size, 0);
        assert!(submitted[0].sample.is_end_of_stream());
        renderer.release();
    }

    #[test]
    fn resampled_frames_are_whole_target_frames() {
        let encoder = RecordingEncoder::new(4096);
        let mut renderer = AudioRenderer::new(shared_encoder(encoder.clone()))
            .with_resampler_config(ResamplerConfig { chunk_frames: 128 });
        renderer
            .init(
                None,
                Some(&MediaFormat::raw_audio(44_100, 2)),
                Some(&MediaFormat::raw_audio(22_050, 1)),
            )
            .unwrap();

        for _ in 0..8 {
            renderer.render_frame(Some(&input_frame(1764, 0, BufferFlags::empty())), 0).unwrap();
        }
        let submitted = encoder.submissions().wait_for(8, WAIT);
        assert_eq!(submitted.len(), 8);
        for submission in &submitted {
            // 441 stereo source frames map to at most ceil(220.5) mono frames.
            assert!(submission.sample.size <= 221 * 2);
            assert_eq!(submission.sample.size % 2, 0);
        }
        renderer.release();
    }

    #[test]
    fn filters_run_before_the_encoder_sees_data() {
        let encoder = RecordingEncoder::new(64);
        let mute = VolumeFilter::new(&VolumeFilterConfig { volume: 0.0 }).unwrap();
        let mut renderer =
            AudioRenderer::new(shared_encoder(encoder.clone())).with_filters(vec![Box::new(mute)]);
        let format = MediaFormat::raw_audio(48_000, 2);
        renderer.init(None, Some(&format), Some(&format)).unwrap();
        assert!(renderer.has_filters());

        renderer.render_frame(Some(&input_frame(8, 0, BufferFlags::empty())), 0).unwrap();
        let submitted = encoder.submissions().wait_for(1, WAIT);
        assert_eq!(submitted[0].payload, vec![0; 8]);
        renderer.release();
    }

    #[test]
    fn backpressured_encoder_keeps_frames_queued() {
        let encoder = RecordingEncoder::new(8).with_input_budget(1);
        let mut renderer = renderer_with(&encoder, 1, 8_000);
        renderer.render_frame(Some(&input_frame(16, 0, BufferFlags::empty())), 0).unwrap();

        let submitted = encoder.submissions().wait_for(1, WAIT);
        assert_eq!(submitted.len(), 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(encoder.submissions().len(), 1);
        assert_eq!(renderer.pending_frames(), 1);

        encoder.grant_inputs(1);
        let submitted = encoder.submissions().wait_for(2, WAIT);
        assert_eq!(submitted.len(), 2);
        renderer.release();
        assert_eq!(renderer.pending_frames(), 0);
    }

    #[test]
    fn consumer_failure_surfaces_without_another_frame() {
        let encoder = FaultyEncoder::new(RecordingEncoder::new(16), EncoderFault::EndOfStreamInput);
        let mut renderer = AudioRenderer::new(shared_encoder(encoder));
        let format = MediaFormat::raw_audio(8_000, 1);
        renderer.init(None, Some(&format), Some(&format)).unwrap();

        // The last frame the decoder ever produces; nothing calls render_frame after it.
        renderer.render_frame(Some(&input_frame(4, 0, BufferFlags::END_OF_STREAM)), 0).unwrap();

        let mut failure = None;
        let surfaced = wait_until(WAIT, || match renderer.check_health() {
            Ok(()) => false,
            Err(e) => {
                failure = Some(e);
                true
            },
        });
        assert!(surfaced, "consumer failure never reported");
        assert!(matches!(failure, Some(MediaKitError::Codec(_))));
        // Reported once.
        assert!(renderer.check_health().is_ok());
        renderer.release();
    }

    fn resampling_renderer(encoder: &RecordingEncoder) -> AudioRenderer {
        let mut renderer = AudioRenderer::new(shared_encoder(encoder.clone()))
            .with_resampler_config(ResamplerConfig { chunk_frames: 128 });
        renderer
            .init(None, Some(&MediaFormat::raw_audio(16_000, 1)), Some(&MediaFormat::raw_audio(8_000, 1)))
            .unwrap();
        renderer
    }

    #[test]
    fn unchanged_format_keeps_resampler_state() {
        let encoder = RecordingEncoder::new(4096);
        let mut renderer = resampling_renderer(&encoder);

        // Half a chunk: buffered by the resampler, nothing comes out yet.
        renderer.render_frame(Some(&input_frame(128, 0, BufferFlags::empty())), 0).unwrap();

        // Same rates and channels, only extra keys.
        let source = MediaFormat::raw_audio(16_000, 1).with_int(keys::DURATION, 1_000_000);
        let target = MediaFormat::raw_audio(8_000, 1).with_int(keys::BIT_RATE, 128_000);
        renderer.on_media_format_changed(Some(&source), Some(&target)).unwrap();

        // Completes the chunk only if the first half survived.
        renderer.render_frame(Some(&input_frame(128, 0, BufferFlags::empty())), 0).unwrap();

        let submitted = encoder.submissions().wait_for(2, WAIT);
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].sample.size, 0);
        assert!(submitted[1].sample.size > 0);
        renderer.release();
    }

    #[test]
    fn changed_rate_rebuilds_the_processor() {
        let encoder = RecordingEncoder::new(4096);
        let mut renderer = resampling_renderer(&encoder);

        renderer.render_frame(Some(&input_frame(128, 0, BufferFlags::empty())), 0).unwrap();
        renderer
            .on_media_format_changed(
                Some(&MediaFormat::raw_audio(32_000, 1)),
                Some(&MediaFormat::raw_audio(8_000, 1)),
            )
            .unwrap();
        // A fresh resampler holds only this half chunk.
        renderer.render_frame(Some(&input_frame(128, 0, BufferFlags::empty())), 0).unwrap();

        let submitted = encoder.submissions().wait_for(2, WAIT);
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].sample.size, 0);
        assert_eq!(submitted[1].sample.size, 0);
        renderer.release();
    }

    #[test]
    fn release_is_idempotent() {
        let encoder = RecordingEncoder::new(8);
        let mut renderer = renderer_with(&encoder, 2, 48_000);
        renderer.release();
        renderer.release();
        assert!(renderer.render_frame(Some(&input_frame(4, 0, BufferFlags::empty())), 0).is_ok());
        assert!(encoder.submissions().is_empty());
        assert!(renderer.init(None, None, None).is_err());
    }

    #[test]
    fn init_requires_formats() {
        let encoder = RecordingEncoder::new(8);
        let mut renderer = AudioRenderer::new(shared_encoder(encoder));
        assert!(matches!(
            renderer.init(None, Some(&MediaFormat::raw_audio(8_000, 1)), None),
            Err(MediaKitError::Configuration(_))
        ));
        assert!(renderer.render_frame(Some(&input_frame(4, 0, BufferFlags::empty())), 0).is_err());
    }
}
