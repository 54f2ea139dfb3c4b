// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-track transcoders.
//!
//! A track transcoder owns one track's pipeline `source → decoder → renderer → encoder →
//! target` and advances it one step per [`TrackTranscoder::process_next_frame`] call. Every
//! codec call inside a tick polls with [`CODEC_POLL_TIMEOUT`], so a tick never blocks on a codec
//! and the owning job can check for cancellation between ticks.
//!
//! Several transcoders may share one [`SharedSource`]: the source cursor is global, so a
//! transcoder only consumes samples of its own track and leaves the others to their owners.

mod audio;
mod factory;
mod passthrough;
mod video;

pub use audio::AudioTrackTranscoder;
pub use factory::{create_track_transcoder, TrackTransformParams};
pub use passthrough::PassthroughTrackTranscoder;
pub use video::VideoTrackTranscoder;

use crate::constants::CODEC_POLL_TIMEOUT;
use crate::disk::selected_duration_us;
use mediakit_core::{
    lock_source, Decoder, Dequeued, Encoder, MediaFormat, MediaKitError, MediaRange, MediaSample,
    Result, SharedSource, SharedTarget, StopReason, TrackState, TranscoderError,
};

/// Outcome of one transcoder tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// The pipeline moved forward.
    FrameProcessed,
    /// A frame was dropped, or the sample under the shared cursor belongs to another track.
    FrameSkipped,
    /// The last sample of the track reached the target.
    EosReached,
    /// The track registered its output format with the target.
    OutputFormatChanged,
    /// A codec is not running; fatal for the track.
    NotRunning,
}

/// One track's transform pipeline, driven tick by tick by a transformation job.
pub trait TrackTranscoder: Send {
    /// Select the source track and start the codecs.
    ///
    /// # Errors
    ///
    /// Returns an error if a codec fails to start.
    fn start(&mut self) -> Result<()>;

    /// Run one non-blocking step of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error on any codec, renderer, source or target failure. Errors are fatal for
    /// the track.
    fn process_next_frame(&mut self) -> Result<TickResult>;

    /// Stop and release the codecs and renderer. Idempotent.
    fn stop(&mut self);

    fn source_track(&self) -> usize;

    fn target_track(&self) -> usize;

    /// Fraction of the track written so far, in `[0, 1]`.
    fn progress(&self) -> f32;

    /// The format registered with the target, once known.
    fn target_media_format(&self) -> Option<MediaFormat>;

    fn decoder_name(&self) -> &str;

    fn encoder_name(&self) -> &str;

    fn samples_written(&self) -> u64;

    fn state(&self) -> TrackState;
}

/// Result of one pipeline stage within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageResult {
    Processed,
    TryAgainLater,
    FormatChanged,
    Skipped,
    Eos,
}

/// Per-track state shared by every transcoder kind.
pub(crate) struct TrackContext {
    source: SharedSource,
    source_track: usize,
    target: SharedTarget,
    target_track: usize,
    range: MediaRange,
    duration_us: i64,
    progress: f32,
    state: TrackState,
    target_format: Option<MediaFormat>,
    registered_track: Option<usize>,
    samples_written: u64,
}

impl TrackContext {
    /// # Errors
    ///
    /// Returns `InvalidMediaRange` when the source selection ends before it starts.
    pub(crate) fn new(
        source: SharedSource,
        source_track: usize,
        target: SharedTarget,
        target_track: usize,
    ) -> Result<Self> {
        let (range, track_duration) = {
            let guard = lock_source(&source)?;
            let range = guard.selection();
            let duration = guard.track_format(source_track).and_then(|f| f.duration_us());
            (range, duration)
        };
        if !range.is_valid() {
            return Err(TranscoderError::InvalidMediaRange.into());
        }
        let duration_us = selected_duration_us(track_duration, range);

        Ok(Self {
            source,
            source_track,
            target,
            target_track,
            range,
            duration_us,
            progress: 0.0,
            state: TrackState::default(),
            target_format: None,
            registered_track: None,
            samples_written: 0,
        })
    }

    pub(crate) fn advance_state(&mut self, next: TrackState) {
        if !self.state.is_stopped() {
            self.state.advance(next);
        }
    }

    pub(crate) fn complete(&mut self) {
        self.progress = 1.0;
        self.advance_state(TrackState::Stopped { reason: StopReason::Completed });
    }

    pub(crate) fn cancel(&mut self) {
        self.advance_state(TrackState::Stopped { reason: StopReason::Cancelled });
    }

    /// Presentation time relative to the start of the selection.
    pub(crate) const fn rebase(&self, presentation_time_us: i64) -> i64 {
        presentation_time_us.saturating_sub(self.range.start_us)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn update_progress(&mut self, presentation_time_us: i64) {
        if self.duration_us <= 0 {
            return;
        }
        let progress = (presentation_time_us as f64 / self.duration_us as f64).clamp(0.0, 1.0) as f32;
        if progress > self.progress {
            self.progress = progress;
        }
    }

    /// Register the output format with the target. Only the first call registers.
    pub(crate) fn register_output(&mut self, format: Option<MediaFormat>) -> Result<()> {
        if self.registered_track.is_some() {
            tracing::warn!(track = self.source_track, "Output format changed again, keeping the first one");
            return Ok(());
        }
        let format = format.ok_or_else(|| {
            MediaKitError::Codec(format!("track {} reported an output format change without a format", self.source_track))
        })?;
        let registered = self.target.add_track(&format, self.target_track)?;
        tracing::info!(
            source_track = self.source_track,
            target_track = registered,
            format = %format,
            "Track registered with target"
        );
        self.registered_track = Some(registered);
        self.target_format = Some(format);
        Ok(())
    }

    /// Write one sample to the registered target track.
    pub(crate) fn write(&mut self, payload: &[u8], sample: &MediaSample) -> Result<()> {
        let track = self.registered_track.ok_or_else(|| {
            MediaKitError::Codec(format!("track {} produced data before its output format", self.source_track))
        })?;
        self.target.write_sample_data(track, payload, sample)?;
        if sample.size > 0 {
            self.samples_written += 1;
            self.update_progress(sample.presentation_time_us);
        }
        Ok(())
    }

    /// Move the next sample of this track from the source into a decoder input frame.
    fn extract(&mut self, decoder: &mut dyn Decoder) -> Result<StageResult> {
        let mut source = lock_source(&self.source)?;
        let current_track = source.sample_track_index();
        if let Some(track) = current_track {
            if track != self.source_track {
                // Samples past the selection are dropped by whichever track sees them first.
                if source.sample_time() >= self.range.end_us {
                    source.advance();
                }
                return Ok(StageResult::Skipped);
            }
        }

        let tag = match decoder.dequeue_input_frame(CODEC_POLL_TIMEOUT)? {
            Dequeued::Frame(tag) => tag,
            Dequeued::TryAgainLater | Dequeued::OutputFormatChanged => {
                return Ok(StageResult::TryAgainLater);
            },
        };
        let mut frame = decoder.get_input_frame(tag).ok_or(TranscoderError::NoFrameAvailable)?;

        let sample_time = source.sample_time();
        if current_track.is_none() || sample_time >= self.range.end_us {
            if current_track.is_some() {
                source.advance();
            }
            drop(source);
            frame.sample = MediaSample::end_of_stream();
            decoder.queue_input_frame(frame)?;
            tracing::debug!(track = self.source_track, sample_time, "Source track exhausted, queued EOS");
            return Ok(StageResult::Eos);
        }

        frame.buffer.clear();
        match source.read_sample_data(&mut frame.buffer)? {
            Some(size) => {
                let size = u32::try_from(size)
                    .map_err(|_| MediaKitError::Source(format!("sample of {size} bytes is too large")))?;
                frame.sample.set(0, size, sample_time, source.sample_flags());
                source.advance();
                drop(source);
                decoder.queue_input_frame(frame)?;
                Ok(StageResult::Processed)
            },
            None => {
                drop(source);
                frame.sample = MediaSample::end_of_stream();
                decoder.queue_input_frame(frame)?;
                tracing::debug!(track = self.source_track, "Source returned no data, queued EOS");
                Ok(StageResult::Eos)
            },
        }
    }

    /// Pull one encoder output item and write it to the target.
    fn drain_encoder(&mut self, encoder: &mut dyn Encoder) -> Result<StageResult> {
        match encoder.dequeue_output_frame(CODEC_POLL_TIMEOUT)? {
            Dequeued::TryAgainLater => Ok(StageResult::TryAgainLater),
            Dequeued::OutputFormatChanged => {
                self.register_output(encoder.output_format())?;
                Ok(StageResult::FormatChanged)
            },
            Dequeued::Frame(tag) => {
                let frame = encoder.get_output_frame(tag).ok_or(TranscoderError::NoFrameAvailable)?;
                let sample = frame.sample;
                let written =
                    if sample.size > 0 && !sample.is_codec_config() { self.write(frame.payload(), &sample) } else { Ok(()) };
                encoder.release_output_frame(frame)?;
                written?;

                if sample.is_end_of_stream() {
                    tracing::debug!(track = self.source_track, samples = self.samples_written, "Encoder reached EOS");
                    self.complete();
                    Ok(StageResult::Eos)
                } else {
                    Ok(StageResult::Processed)
                }
            },
        }
    }
}

/// Tracks which stages of a decode-render-encode pipeline have reached end of stream.
#[derive(Debug, Default, Clone, Copy)]
struct StageProgress {
    extracted: bool,
    decoded: bool,
    encoded: bool,
}

impl StageProgress {
    /// Fold the decode and encode stage outcomes of one tick into a tick result.
    const fn tick_result(decoded: StageResult, encoded: StageResult) -> TickResult {
        match (decoded, encoded) {
            (_, StageResult::Eos) => TickResult::EosReached,
            (_, StageResult::FormatChanged) => TickResult::OutputFormatChanged,
            (StageResult::Skipped, _) => TickResult::FrameSkipped,
            _ => TickResult::FrameProcessed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mediakit_codecs::containers::SyncedMuxerTarget;
    use mediakit_codecs::passthrough::PassthroughDecoder;
    use mediakit_codecs::test_utils::{RecordingWriter, SourceSample, VecMediaSource};
    use mediakit_core::{keys, mime, shared_source, BufferFlags, MediaSource};
    use std::sync::Arc;

    fn target() -> SharedTarget {
        Arc::new(SyncedMuxerTarget::new(RecordingWriter::new(), 1, None).unwrap())
    }

    fn format() -> MediaFormat {
        MediaFormat::raw_audio(8_000, 1).with_int(keys::DURATION, 1_000)
    }

    #[test]
    fn duration_is_clipped_to_the_selection() {
        let source = VecMediaSource::new()
            .with_track(format(), vec![SourceSample::new(0, vec![0u8; 2])])
            .with_selection(MediaRange::new(200, 600));
        let ctx = TrackContext::new(shared_source(source), 0, target(), 0).unwrap();
        assert_eq!(ctx.duration_us, 400);
        assert_eq!(ctx.rebase(250), 50);

        let source = VecMediaSource::new()
            .with_track(format(), Vec::new())
            .with_selection(MediaRange::new(200, i64::MAX));
        let ctx = TrackContext::new(shared_source(source), 0, target(), 0).unwrap();
        assert_eq!(ctx.duration_us, 800);
    }

    #[test]
    fn inverted_selection_is_rejected() {
        let source = VecMediaSource::new().with_track(format(), Vec::new()).with_selection(MediaRange::new(10, 5));
        assert!(matches!(
            TrackContext::new(shared_source(source), 0, target(), 0),
            Err(MediaKitError::Transcoder(TranscoderError::InvalidMediaRange))
        ));
    }

    #[test]
    fn extract_leaves_other_tracks_alone() {
        let mut source = VecMediaSource::new()
            .with_track(format(), vec![SourceSample::new(10, vec![1u8])])
            .with_track(MediaFormat::video(mime::VIDEO_RAW, 1, 1), vec![SourceSample::new(0, vec![2u8])]);
        source.select_track(0);
        source.select_track(1);
        let source = shared_source(source);
        let mut ctx = TrackContext::new(Arc::clone(&source), 0, target(), 0).unwrap();
        let mut decoder = PassthroughDecoder::new(4);
        decoder.init(&format(), None).unwrap();
        decoder.start().unwrap();

        assert_eq!(ctx.extract(&mut decoder).unwrap(), StageResult::Skipped);
        assert_eq!(lock_source(&source).unwrap().sample_track_index(), Some(1));

        lock_source(&source).unwrap().advance();
        assert_eq!(ctx.extract(&mut decoder).unwrap(), StageResult::Processed);
        assert_eq!(ctx.extract(&mut decoder).unwrap(), StageResult::Eos);
    }

    #[test]
    fn samples_past_the_selection_end_the_track() {
        let mut source = VecMediaSource::new()
            .with_track(
                format(),
                vec![SourceSample::new(0, vec![1u8]), SourceSample::new(500, vec![2u8]), SourceSample::new(600, vec![3u8])],
            )
            .with_selection(MediaRange::new(0, 500));
        source.select_track(0);
        let source = shared_source(source);
        let mut ctx = TrackContext::new(Arc::clone(&source), 0, target(), 0).unwrap();
        let mut decoder = PassthroughDecoder::new(4);
        decoder.init(&format(), None).unwrap();

        assert_eq!(ctx.extract(&mut decoder).unwrap(), StageResult::Processed);
        assert_eq!(ctx.extract(&mut decoder).unwrap(), StageResult::Eos);
        assert_eq!(lock_source(&source).unwrap().sample_time(), 600);
    }

    #[test]
    fn writes_need_a_registered_track() {
        let source = VecMediaSource::new().with_track(format(), Vec::new());
        let mut ctx = TrackContext::new(shared_source(source), 0, target(), 0).unwrap();
        let sample = MediaSample::new(0, 1, 500, BufferFlags::SYNC);
        assert!(ctx.write(&[1], &sample).is_err());

        ctx.register_output(Some(format())).unwrap();
        ctx.register_output(Some(MediaFormat::raw_audio(1, 1))).unwrap();
        assert_eq!(ctx.target_format, Some(format()));
        ctx.write(&[1], &sample).unwrap();
        assert_eq!(ctx.samples_written, 1);
        assert!((ctx.progress - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn tick_result_prefers_encoder_outcome() {
        assert_eq!(StageProgress::tick_result(StageResult::Skipped, StageResult::Eos), TickResult::EosReached);
        assert_eq!(
            StageProgress::tick_result(StageResult::Processed, StageResult::FormatChanged),
            TickResult::OutputFormatChanged
        );
        assert_eq!(
            StageProgress::tick_result(StageResult::Skipped, StageResult::TryAgainLater),
            TickResult::FrameSkipped
        );
    }
}
