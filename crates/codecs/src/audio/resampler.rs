// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sample-rate conversion backed by rubato's FastFixedIn resampler.
//!
//! Rubato consumes fixed-size chunks, while decoded frames arrive in arbitrary sizes. Input is
//! buffered per channel until a full chunk is available and converted output is held back
//! until a caller asks for it, so each `process` call reports at most the estimated number of
//! target frames for its input and any surplus carries over to the next call.

use super::mixing::{mix_channels, validate_channel_mix};
use super::processor::{AudioParams, AudioProcessor, ResamplerConfig};
use mediakit_core::{pcm, MediaKitError, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;

pub struct ResamplingProcessor {
    params: AudioParams,
    resampler: FastFixedIn<f32>,
    decoded: Vec<f32>,
    mixed: Vec<f32>,
    /// Planar input waiting for a full chunk.
    pending: Vec<Vec<f32>>,
    /// Planar output waiting to be handed out.
    resampled: Vec<VecDeque<f32>>,
}

impl ResamplingProcessor {
    /// # Errors
    ///
    /// Returns `MediaKitError::Configuration` if the channel conversion is unsupported, the
    /// chunk size is zero or rubato rejects the ratio.
    pub fn new(params: AudioParams, config: &ResamplerConfig) -> Result<Self> {
        validate_channel_mix(params.source_channels, params.target_channels)?;
        if config.chunk_frames == 0 {
            return Err(MediaKitError::Configuration(
                "chunk_frames must be greater than 0".to_string(),
            ));
        }

        let channels = usize::from(params.target_channels);
        let resampler = FastFixedIn::<f32>::new(
            params.sampling_ratio(),
            1.0,
            PolynomialDegree::Linear,
            config.chunk_frames,
            channels,
        )
        .map_err(|e| MediaKitError::Configuration(format!("Failed to create resampler: {e}")))?;

        Ok(Self {
            params,
            resampler,
            decoded: Vec::new(),
            mixed: Vec::new(),
            pending: vec![Vec::with_capacity(config.chunk_frames); channels],
            resampled: vec![VecDeque::new(); channels],
        })
    }

    fn convert_ready_chunks(&mut self) -> Result<()> {
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.first().map_or(0, Vec::len) < needed {
                return Ok(());
            }
            let chunk: Vec<Vec<f32>> =
                self.pending.iter_mut().map(|channel| channel.drain(..needed).collect()).collect();
            let output = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| MediaKitError::Runtime(format!("Resampling failed: {e}")))?;
            for (queue, data) in self.resampled.iter_mut().zip(output) {
                queue.extend(data);
            }
        }
    }
}

impl AudioProcessor for ResamplingProcessor {
    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let source_bytes = self.params.source_frame_bytes();
        let target_channels = usize::from(self.params.target_channels);
        let source_frames = input.len() / source_bytes;

        pcm::s16le_to_f32(&input[..source_frames * source_bytes], &mut self.decoded);
        mix_channels(
            &self.decoded,
            usize::from(self.params.source_channels),
            target_channels,
            &mut self.mixed,
        );
        for frame in self.mixed.chunks_exact(target_channels) {
            for (channel, sample) in self.pending.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        self.convert_ready_chunks()?;

        let count = self
            .resampled
            .first()
            .map_or(0, VecDeque::len)
            .min(self.params.estimated_target_frames(source_frames))
            .min(output.len() / self.params.target_frame_bytes());

        let mut slots = output.chunks_exact_mut(pcm::BYTES_PER_SAMPLE);
        for _ in 0..count {
            for queue in &mut self.resampled {
                let sample = queue.pop_front().unwrap_or_default();
                if let Some(slot) = slots.next() {
                    slot.copy_from_slice(&pcm::f32_to_s16le(sample));
                }
            }
        }
        Ok(count)
    }

    fn release(&mut self) {
        self.pending.iter_mut().for_each(Vec::clear);
        self.resampled.iter_mut().for_each(VecDeque::clear);
        self.resampler.reset();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params(src_rate: u32, src_ch: u16, tgt_rate: u32, tgt_ch: u16) -> AudioParams {
        AudioParams {
            source_sample_rate: src_rate,
            source_channels: src_ch,
            target_sample_rate: tgt_rate,
            target_channels: tgt_ch,
        }
    }

    fn tone(frames: usize, channels: usize) -> Vec<u8> {
        (0..frames * channels)
            .flat_map(|i| {
                #[allow(clippy::cast_possible_truncation)]
                let value = ((i % 200) as i16 - 100) * 100;
                value.to_le_bytes()
            })
            .collect()
    }

    #[test]
    fn sample_count_never_exceeds_estimate() {
        let params = params(44_100, 2, 48_000, 1);
        let mut processor =
            ResamplingProcessor::new(params, &ResamplerConfig { chunk_frames: 256 }).unwrap();
        let mut total = 0;

        for source_frames in [441, 100, 1000, 7, 2048, 441] {
            let estimate = params.estimated_target_frames(source_frames);
            let mut output = vec![0u8; estimate * params.target_frame_bytes()];
            let count = processor.process(&tone(source_frames, 2), &mut output).unwrap();
            assert!(count <= estimate, "{count} > {estimate}");
            total += count;
        }
        assert!(total > 0);
    }

    #[test]
    fn downsampling_halves_the_stream() {
        let params = params(48_000, 1, 24_000, 1);
        let mut processor =
            ResamplingProcessor::new(params, &ResamplerConfig { chunk_frames: 480 }).unwrap();
        let mut total = 0;
        for _ in 0..20 {
            let mut output = vec![0u8; params.estimated_target_frames(480) * 2];
            total += processor.process(&tone(480, 1), &mut output).unwrap();
        }
        // 9600 input frames; the resampler delay holds back at most a chunk.
        assert!(total <= 4800);
        assert!(total >= 4800 - 480, "total {total}");
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let result = ResamplingProcessor::new(
            params(44_100, 2, 48_000, 2),
            &ResamplerConfig { chunk_frames: 0 },
        );
        assert!(matches!(result.err(), Some(MediaKitError::Configuration(_))));
    }

    #[test]
    fn release_drops_buffered_audio() {
        let params = params(16_000, 1, 48_000, 1);
        let mut processor =
            ResamplingProcessor::new(params, &ResamplerConfig { chunk_frames: 160 }).unwrap();
        let mut output = vec![0u8; 2];
        processor.process(&tone(1600, 1), &mut output).unwrap();
        processor.release();
        processor.release();
        assert!(processor.resampled.iter().all(VecDeque::is_empty));
    }
}
