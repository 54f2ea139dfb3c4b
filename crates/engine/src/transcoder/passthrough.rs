// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use super::{TickResult, TrackContext, TrackTranscoder};
use crate::constants::DEFAULT_PASSTHROUGH_BUFFER_SIZE;
use mediakit_core::{
    keys, lock_source, BufferFlags, ByteBuffer, MediaFormat, MediaKitError, MediaSample, Result,
    SharedSource, SharedTarget, TrackState, TranscoderError,
};

const CODEC_NAME: &str = "passthrough";

/// Copies source samples straight into the target without decoding.
pub struct PassthroughTrackTranscoder {
    ctx: TrackContext,
    source_format: MediaFormat,
    buffer: Option<ByteBuffer>,
    finished: bool,
}

impl PassthroughTrackTranscoder {
    /// # Errors
    ///
    /// Returns an error if the source track has no format or the selection is invalid.
    pub fn new(
        source: SharedSource,
        source_track: usize,
        target: SharedTarget,
        target_track: usize,
    ) -> Result<Self> {
        let source_format = lock_source(&source)?
            .track_format(source_track)
            .ok_or(TranscoderError::SourceTrackMimeTypeNotFound)?;
        let mut ctx = TrackContext::new(source, source_track, target, target_track)?;
        ctx.advance_state(TrackState::Initialized);
        Ok(Self { ctx, source_format, buffer: None, finished: false })
    }

    fn buffer_size(&self) -> usize {
        self.source_format
            .get_int(keys::MAX_INPUT_SIZE)
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PASSTHROUGH_BUFFER_SIZE)
    }

    fn finish(&mut self) -> TickResult {
        self.finished = true;
        self.ctx.complete();
        tracing::debug!(track = self.ctx.source_track, samples = self.ctx.samples_written, "Passthrough track finished");
        TickResult::EosReached
    }
}

impl TrackTranscoder for PassthroughTrackTranscoder {
    fn start(&mut self) -> Result<()> {
        lock_source(&self.ctx.source)?.select_track(self.ctx.source_track);
        self.ctx.advance_state(TrackState::Running);
        tracing::info!(track = self.ctx.source_track, format = %self.source_format, "Passthrough transcoder started");
        Ok(())
    }

    fn process_next_frame(&mut self) -> Result<TickResult> {
        if self.finished {
            return Ok(TickResult::EosReached);
        }
        if self.ctx.state != TrackState::Running {
            return Ok(TickResult::NotRunning);
        }

        let Some(buffer) = self.buffer.as_mut() else {
            self.ctx.register_output(Some(self.source_format.clone()))?;
            self.buffer = Some(ByteBuffer::allocate(self.buffer_size()));
            return Ok(TickResult::OutputFormatChanged);
        };

        let mut source = lock_source(&self.ctx.source)?;
        let Some(track) = source.sample_track_index() else {
            drop(source);
            return Ok(self.finish());
        };

        let sample_time = source.sample_time();
        if track != self.ctx.source_track {
            if sample_time >= self.ctx.range.end_us {
                source.advance();
            }
            return Ok(TickResult::FrameSkipped);
        }

        if sample_time >= self.ctx.range.end_us {
            source.advance();
            drop(source);
            let eos = MediaSample::new(0, 0, self.ctx.rebase(sample_time), BufferFlags::END_OF_STREAM);
            self.ctx.write(&[], &eos)?;
            return Ok(self.finish());
        }

        buffer.clear();
        let Some(size) = source.read_sample_data(buffer)? else {
            drop(source);
            return Ok(self.finish());
        };
        let flags = source.sample_flags() & BufferFlags::SYNC;
        source.advance();
        drop(source);

        if sample_time < self.ctx.range.start_us {
            return Ok(TickResult::FrameSkipped);
        }
        let size_u32 = u32::try_from(size)
            .map_err(|_| MediaKitError::Source(format!("sample of {size} bytes is too large")))?;
        let sample = MediaSample::new(0, size_u32, self.ctx.rebase(sample_time), flags);
        self.ctx.write(buffer.region(0, size), &sample)?;
        Ok(TickResult::FrameProcessed)
    }

    fn stop(&mut self) {
        self.buffer = None;
        self.ctx.cancel();
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
        CODEC_NAME
    }

    fn encoder_name(&self) -> &str {
        CODEC_NAME
    }

    fn samples_written(&self) -> u64 {
        self.ctx.samples_written
    }

    fn state(&self) -> TrackState {
        self.ctx.state
    }
}
