// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::{StageProgress, StageResult, TickResult, TrackContext, TrackTranscoder};
use crate::constants::CODEC_POLL_TIMEOUT;
use mediakit_codecs::video::FrameDropper;
use mediakit_core::{
    lock_encoder, lock_source, Decoder, Dequeued, MediaFormat, Renderer, Result, SharedEncoder,
    SharedSource, SharedTarget, TrackState, TranscoderError,
};

/// Video track pipeline: the decoder draws into the renderer's surface and the renderer draws
/// into the encoder's input surface.
pub struct VideoTrackTranscoder {
    ctx: TrackContext,
    decoder: Box<dyn Decoder>,
    encoder: SharedEncoder,
    renderer: Box<dyn Renderer>,
    source_format: MediaFormat,
    target_format: MediaFormat,
    frame_dropper: Option<FrameDropper>,
    decoder_name: String,
    encoder_name: String,
    stages: StageProgress,
    stopped: bool,
}

impl VideoTrackTranscoder {
    /// Initialise the encoder, then the renderer over the encoder's input surface, then the
    /// decoder over the renderer's input surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection is invalid or any component rejects its format.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: SharedSource,
        source_track: usize,
        target: SharedTarget,
        target_track: usize,
        target_format: MediaFormat,
        mut decoder: Box<dyn Decoder>,
        encoder: SharedEncoder,
        mut renderer: Box<dyn Renderer>,
    ) -> Result<Self> {
        let source_format = lock_source(&source)?
            .track_format(source_track)
            .ok_or(TranscoderError::SourceTrackMimeTypeNotFound)?;
        let mut ctx = TrackContext::new(source, source_track, target, target_track)?;

        let (input_surface, encoder_name) = {
            let mut encoder = lock_encoder(&encoder)?;
            encoder.init(&target_format)?;
            (encoder.create_input_surface(), encoder.name().to_string())
        };
        renderer.init(input_surface, Some(&source_format), Some(&target_format))?;
        decoder.init(&source_format, renderer.input_surface())?;

        let frame_dropper = FrameDropper::for_rates(source_format.frame_rate(), target_format.frame_rate());
        if frame_dropper.is_some() {
            tracing::debug!(
                track = source_track,
                source_fps = ?source_format.frame_rate(),
                target_fps = ?target_format.frame_rate(),
                "Dropping frames to reach the target frame rate"
            );
        }
        ctx.advance_state(TrackState::Initialized);

        Ok(Self {
            ctx,
            decoder_name: decoder.name().to_string(),
            decoder,
            encoder,
            renderer,
            source_format,
            target_format,
            frame_dropper,
            encoder_name,
            stages: StageProgress::default(),
            stopped: false,
        })
    }

    fn decode(&mut self) -> Result<StageResult> {
        match self.decoder.dequeue_output_frame(CODEC_POLL_TIMEOUT)? {
            Dequeued::TryAgainLater => Ok(StageResult::TryAgainLater),
            Dequeued::OutputFormatChanged => {
                if let Some(format) = self.decoder.output_format() {
                    self.source_format = format;
                }
                self.renderer.on_media_format_changed(Some(&self.source_format), Some(&self.target_format))?;
                Ok(StageResult::FormatChanged)
            },
            Dequeued::Frame(tag) => {
                let frame = self.decoder.get_output_frame(tag).ok_or(TranscoderError::NoFrameAvailable)?;
                let sample = frame.sample;

                if sample.is_end_of_stream() {
                    self.decoder.release_output_frame(frame, false)?;
                    lock_encoder(&self.encoder)?.signal_end_of_input_stream()?;
                    tracing::debug!(track = self.ctx.source_track, "Decoder reached EOS, signalled encoder");
                    self.ctx.advance_state(TrackState::Draining);
                    return Ok(StageResult::Eos);
                }

                let in_selection = sample.presentation_time_us >= self.ctx.range.start_us;
                let render = in_selection && self.frame_dropper.as_mut().is_none_or(FrameDropper::should_render);
                self.decoder.release_output_frame(frame, render)?;

                if render {
                    let presentation_time_ns = self.ctx.rebase(sample.presentation_time_us).saturating_mul(1000);
                    self.renderer.render_frame(None, presentation_time_ns)?;
                    Ok(StageResult::Processed)
                } else {
                    Ok(StageResult::Skipped)
                }
            },
        }
    }

    fn encode(&mut self) -> Result<StageResult> {
        let result = {
            let mut encoder = lock_encoder(&self.encoder)?;
            self.ctx.drain_encoder(&mut *encoder)?
        };
        if result == StageResult::FormatChanged {
            self.renderer.on_media_format_changed(Some(&self.source_format), self.ctx.target_format.as_ref())?;
        }
        Ok(result)
    }
}

impl TrackTranscoder for VideoTrackTranscoder {
    fn start(&mut self) -> Result<()> {
        lock_source(&self.ctx.source)?.select_track(self.ctx.source_track);
        lock_encoder(&self.encoder)?.start()?;
        self.decoder.start()?;
        self.ctx.advance_state(TrackState::Running);
        tracing::info!(
            track = self.ctx.source_track,
            decoder = %self.decoder_name,
            encoder = %self.encoder_name,
            filters = self.renderer.has_filters(),
            "Video transcoder started"
        );
        Ok(())
    }

    fn process_next_frame(&mut self) -> Result<TickResult> {
        if !lock_encoder(&self.encoder)?.is_running() || !self.decoder.is_running() {
            return Ok(TickResult::NotRunning);
        }
        self.renderer.check_health()?;

        if !self.stages.extracted && self.ctx.extract(self.decoder.as_mut())? == StageResult::Eos {
            self.stages.extracted = true;
        }

        let decoded = if self.stages.decoded { StageResult::Eos } else { self.decode()? };
        if decoded == StageResult::Eos {
            self.stages.decoded = true;
        }

        let encoded = if self.stages.encoded { StageResult::Eos } else { self.encode()? };
        if encoded == StageResult::Eos {
            self.stages.encoded = true;
        }

        Ok(StageProgress::tick_result(decoded, encoded))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.decoder.stop();
        self.decoder.release();
        self.renderer.release();
        match lock_encoder(&self.encoder) {
            Ok(mut encoder) => {
                encoder.stop();
                encoder.release();
            },
            Err(e) => tracing::warn!(error = %e, "Failed to release video encoder"),
        }
        self.ctx.cancel();
        tracing::debug!(track = self.ctx.source_track, "Video transcoder stopped");
    }

    fn source_track(&self) -> usize {
        self.ctx.source_track
    }

    fn target_track(&self) -> usize {
        self.ctx.target_track
    }

    fn progress(&self) -> f32 {
        self.ctx.progress
    }

    fn target_media_format(&self) -> Option<MediaFormat> {
        self.ctx.target_format.clone()
    }

    fn decoder_name(&self) -> &str {
        &self.decoder_name
    }

    fn encoder_name(&self) -> &str {
        &self.encoder_name
    }

    fn samples_written(&self) -> u64 {
        self.ctx.samples_written
    }

    fn state(&self) -> TrackState {
        self.ctx.state
    }
}
