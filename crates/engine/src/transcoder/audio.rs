// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::{StageProgress, StageResult, TickResult, TrackContext, TrackTranscoder};
use crate::constants::CODEC_POLL_TIMEOUT;
use mediakit_core::{
    lock_encoder, lock_source, Decoder, Dequeued, MediaFormat, Renderer, Result, SharedEncoder,
    SharedSource, SharedTarget, TrackState, TranscoderError,
};

/// Audio track pipeline: decoded frames go through a buffer renderer, which feeds the encoder's
/// input buffers on its own.
pub struct AudioTrackTranscoder {
    ctx: TrackContext,
    decoder: Box<dyn Decoder>,
    encoder: SharedEncoder,
    renderer: Box<dyn Renderer>,
    /// Format the renderer converts from; follows decoder format changes.
    decoded_format: MediaFormat,
    target_format: MediaFormat,
    decoder_name: String,
    encoder_name: String,
    stages: StageProgress,
    stopped: bool,
}

impl AudioTrackTranscoder {
    /// Initialise the encoder, renderer and decoder, in that order.
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

        let encoder_name = {
            let mut encoder = lock_encoder(&encoder)?;
            encoder.init(&target_format)?;
            encoder.name().to_string()
        };
        renderer.init(None, Some(&source_format), Some(&target_format))?;
        decoder.init(&source_format, None)?;
        ctx.advance_state(TrackState::Initialized);

        Ok(Self {
            ctx,
            decoder_name: decoder.name().to_string(),
            decoder,
            encoder,
            renderer,
            decoded_format: source_format,
            target_format,
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
                    tracing::debug!(track = self.ctx.source_track, format = %format, "Decoder output format changed");
                    self.decoded_format = format;
                }
                self.renderer.on_media_format_changed(Some(&self.decoded_format), Some(&self.target_format))?;
                Ok(StageResult::FormatChanged)
            },
            Dequeued::Frame(tag) => {
                let frame = self.decoder.get_output_frame(tag).ok_or(TranscoderError::NoFrameAvailable)?;
                let sample = frame.sample;
                let eos = sample.is_end_of_stream();
                let in_selection = sample.presentation_time_us >= self.ctx.range.start_us;

                let rendered = if eos || in_selection {
                    let presentation_time_ns = self.ctx.rebase(sample.presentation_time_us).saturating_mul(1000);
                    self.renderer.render_frame(Some(&frame), presentation_time_ns)
                } else {
                    Ok(())
                };
                self.decoder.release_output_frame(frame, false)?;
                rendered?;

                if eos {
                    tracing::debug!(track = self.ctx.source_track, "Decoder reached EOS");
                    self.ctx.advance_state(TrackState::Draining);
                    Ok(StageResult::Eos)
                } else if in_selection {
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
            self.renderer.on_media_format_changed(Some(&self.decoded_format), self.ctx.target_format.as_ref())?;
        }
        Ok(result)
    }
}

impl TrackTranscoder for AudioTrackTranscoder {
    fn start(&mut self) -> Result<()> {
        lock_source(&self.ctx.source)?.select_track(self.ctx.source_track);
        lock_encoder(&self.encoder)?.start()?;
        self.decoder.start()?;
        self.ctx.advance_state(TrackState::Running);
        tracing::info!(
            track = self.ctx.source_track,
            decoder = %self.decoder_name,
            encoder = %self.encoder_name,
            "Audio transcoder started"
        );
        Ok(())
    }

    fn process_next_frame(&mut self) -> Result<TickResult> {
        if !lock_encoder(&self.encoder)?.is_running() || !self.decoder.is_running() {
            return Ok(TickResult::NotRunning);
        }
        // The renderer feeds the encoder from its own thread; its failures surface here.
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
        // The renderer may still be feeding the encoder from its own thread.
        self.renderer.release();
        match lock_encoder(&self.encoder) {
            Ok(mut encoder) => {
                encoder.stop();
                encoder.release();
            },
            Err(e) => tracing::warn!(error = %e, "Failed to release audio encoder"),
        }
        self.decoder.stop();
        self.decoder.release();
        self.ctx.cancel();
        tracing::debug!(track = self.ctx.source_track, "Audio transcoder stopped");
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mediakit_codecs::audio::{AudioRenderer, PassthroughSoftwareRenderer};
    use mediakit_codecs::containers::SyncedMuxerTarget;
    use mediakit_codecs::passthrough::{PassthroughDecoder, PassthroughEncoder};
    use mediakit_codecs::test_utils::{
        EncoderFault, FaultyEncoder, RecordingWriter, SourceSample, VecMediaSource, WriterEvent,
    };
    use mediakit_core::{keys, shared_encoder, shared_source, MediaKitError, MediaRange, StopReason};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn pcm_format() -> MediaFormat {
        MediaFormat::raw_audio(1_000, 1).with_int(keys::DURATION, 4_000)
    }

    /// Four 2-byte samples, each one millisecond of 1kHz mono PCM.
    fn pcm_source(selection: MediaRange) -> VecMediaSource {
        let samples =
            (0u8..4).map(|i| SourceSample::new(i64::from(i) * 1_000, vec![i, i])).collect();
        VecMediaSource::new().with_track(pcm_format(), samples).with_selection(selection)
    }

    fn run_to_eos(transcoder: &mut dyn TrackTranscoder) -> Vec<TickResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut ticks = Vec::new();
        loop {
            let tick = transcoder.process_next_frame().unwrap();
            ticks.push(tick);
            if tick == TickResult::EosReached {
                return ticks;
            }
            assert!(Instant::now() < deadline, "transcoder did not reach EOS");
            std::thread::yield_now();
        }
    }

    fn samples(writer: &RecordingWriter) -> Vec<(Vec<u8>, i64)> {
        writer
            .events()
            .into_iter()
            .filter_map(|event| match event {
                WriterEvent::Sample { data, presentation_time_us, .. } => Some((data, presentation_time_us)),
                _ => None,
            })
            .collect()
    }

    fn transcoder(
        selection: MediaRange,
        writer: &RecordingWriter,
        renderer: impl FnOnce(SharedEncoder) -> Box<dyn Renderer>,
    ) -> AudioTrackTranscoder {
        let target = Arc::new(SyncedMuxerTarget::new(writer.clone(), 1, None).unwrap());
        let encoder = shared_encoder(PassthroughEncoder::new(64));
        AudioTrackTranscoder::new(
            shared_source(pcm_source(selection)),
            0,
            target,
            0,
            MediaFormat::raw_audio(1_000, 1),
            Box::new(PassthroughDecoder::new(64)),
            Arc::clone(&encoder),
            renderer(encoder),
        )
        .unwrap()
    }

    #[test]
    fn passthrough_renderer_copies_every_sample() {
        let writer = RecordingWriter::new();
        let mut transcoder =
            transcoder(MediaRange::default(), &writer, |e| Box::new(PassthroughSoftwareRenderer::new(e)));
        assert_eq!(transcoder.state(), TrackState::Initialized);
        assert_eq!(transcoder.process_next_frame().unwrap(), TickResult::NotRunning);

        transcoder.start().unwrap();
        let ticks = run_to_eos(&mut transcoder);
        assert!(ticks.contains(&TickResult::OutputFormatChanged));

        assert_eq!(
            samples(&writer),
            vec![(vec![0, 0], 0), (vec![1, 1], 1_000), (vec![2, 2], 2_000), (vec![3, 3], 3_000)]
        );
        assert_eq!(transcoder.samples_written(), 4);
        assert_eq!(transcoder.state(), TrackState::Stopped { reason: StopReason::Completed });
        assert!((transcoder.progress() - 1.0).abs() < f32::EPSILON);
        assert_eq!(transcoder.decoder_name(), "PassthroughDecoder");
        assert_eq!(transcoder.encoder_name(), "PassthroughEncoder");

        transcoder.stop();
        transcoder.stop();
        assert_eq!(transcoder.state(), TrackState::Stopped { reason: StopReason::Completed });
    }

    #[test]
    fn selection_rebases_and_trims() {
        let writer = RecordingWriter::new();
        let mut source_transcoder = transcoder(MediaRange::new(1_000, 3_000), &writer, |e| {
            Box::new(PassthroughSoftwareRenderer::new(e))
        });
        source_transcoder.start().unwrap();
        run_to_eos(&mut source_transcoder);
        source_transcoder.stop();

        assert_eq!(samples(&writer), vec![(vec![1, 1], 0), (vec![2, 2], 1_000)]);
    }

    #[test]
    fn audio_renderer_keeps_its_own_clock() {
        let writer = RecordingWriter::new();
        let mut transcoder =
            transcoder(MediaRange::default(), &writer, |e| Box::new(AudioRenderer::new(e)));
        transcoder.start().unwrap();
        run_to_eos(&mut transcoder);
        transcoder.stop();

        let written = samples(&writer);
        let payload: Vec<u8> = written.iter().flat_map(|(data, _)| data.clone()).collect();
        assert_eq!(payload, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        assert_eq!(written[0].1, 0);
    }

    #[test]
    fn renderer_failure_after_decoder_eos_fails_the_tick() {
        let target = Arc::new(SyncedMuxerTarget::new(RecordingWriter::new(), 1, None).unwrap());
        let encoder = shared_encoder(FaultyEncoder::new(PassthroughEncoder::new(64), EncoderFault::EndOfStreamInput));
        let mut transcoder = AudioTrackTranscoder::new(
            shared_source(pcm_source(MediaRange::default())),
            0,
            target,
            0,
            MediaFormat::raw_audio(1_000, 1),
            Box::new(PassthroughDecoder::new(64)),
            Arc::clone(&encoder),
            Box::new(AudioRenderer::new(encoder)),
        )
        .unwrap();
        transcoder.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let error = loop {
            match transcoder.process_next_frame() {
                Ok(tick) => assert_ne!(tick, TickResult::EosReached),
                Err(e) => break e,
            }
            assert!(Instant::now() < deadline, "renderer failure was never reported");
            std::thread::yield_now();
        };
        assert!(matches!(error, MediaKitError::Codec(_)), "got {error}");
        transcoder.stop();
    }

    #[test]
    fn stop_before_eos_cancels() {
        let writer = RecordingWriter::new();
        let mut transcoder =
            transcoder(MediaRange::default(), &writer, |e| Box::new(PassthroughSoftwareRenderer::new(e)));
        transcoder.start().unwrap();
        transcoder.process_next_frame().unwrap();
        transcoder.stop();
        assert_eq!(transcoder.state(), TrackState::Stopped { reason: StopReason::Cancelled });
        assert_eq!(transcoder.process_next_frame().unwrap(), TickResult::NotRunning);
    }
}
