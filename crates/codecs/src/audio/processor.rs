// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Channel and sample-rate conversion of 16-bit PCM frames.

use super::mixing::ChannelMixingProcessor;
use mediakit_core::{pcm, MediaFormat, MediaKitError, Result};
use serde::{Deserialize, Serialize};

/// Source and target PCM layouts a processor converts between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub source_sample_rate: u32,
    pub source_channels: u16,
    pub target_sample_rate: u32,
    pub target_channels: u16,
}

impl AudioParams {
    /// Read rates and channel counts from both formats.
    ///
    /// # Errors
    ///
    /// Returns `MediaKitError::Configuration` if either format lacks a positive sample rate or
    /// channel count.
    pub fn from_formats(source: &MediaFormat, target: &MediaFormat) -> Result<Self> {
        let layout = |format: &MediaFormat, side: &str| -> Result<(u32, u16)> {
            let rate = format.sample_rate().filter(|rate| *rate > 0);
            let channels = format
                .channel_count()
                .and_then(|channels| u16::try_from(channels).ok())
                .filter(|channels| *channels > 0);
            match (rate, channels) {
                (Some(rate), Some(channels)) => Ok((rate, channels)),
                _ => Err(MediaKitError::Configuration(format!(
                    "{side} audio format needs a sample rate and channel count, got {format}"
                ))),
            }
        };
        let (source_sample_rate, source_channels) = layout(source, "source")?;
        let (target_sample_rate, target_channels) = layout(target, "target")?;
        Ok(Self { source_sample_rate, source_channels, target_sample_rate, target_channels })
    }

    /// `target_sample_rate / source_sample_rate`.
    pub fn sampling_ratio(&self) -> f64 {
        f64::from(self.target_sample_rate) / f64::from(self.source_sample_rate)
    }

    pub fn source_frame_bytes(&self) -> usize {
        pcm::frame_bytes(usize::from(self.source_channels))
    }

    pub fn target_frame_bytes(&self) -> usize {
        pcm::frame_bytes(usize::from(self.target_channels))
    }

    pub const fn is_identity(&self) -> bool {
        self.source_sample_rate == self.target_sample_rate
            && self.source_channels == self.target_channels
    }

    /// Upper bound on target frames produced from `source_frames` input frames.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn estimated_target_frames(&self, source_frames: usize) -> usize {
        (source_frames as f64 * self.sampling_ratio()).ceil() as usize
    }
}

/// Resampler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerConfig {
    /// Input frames per resampler chunk. Larger values trade latency for throughput.
    pub chunk_frames: usize,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self { chunk_frames: 1024 }
    }
}

/// Converts interleaved s16le PCM from one layout to another.
pub trait AudioProcessor: Send {
    /// Convert `input` into `output` and return the number of target frames written.
    ///
    /// The count is authoritative: it never exceeds
    /// [`AudioParams::estimated_target_frames`] for the input, nor what fits in `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversion backend fails.
    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize>;

    fn release(&mut self) {}
}

/// Copies input straight through when both layouts match.
#[derive(Debug)]
pub struct PassthroughAudioProcessor {
    frame_bytes: usize,
}

impl PassthroughAudioProcessor {
    pub fn new(channels: u16) -> Self {
        Self { frame_bytes: pcm::frame_bytes(usize::from(channels)) }
    }
}

impl AudioProcessor for PassthroughAudioProcessor {
    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let frames = input.len().min(output.len()) / self.frame_bytes;
        let bytes = frames * self.frame_bytes;
        output[..bytes].copy_from_slice(&input[..bytes]);
        Ok(frames)
    }
}

/// Pick the processor for `params`: identity when layouts match, channel mixing when only the
/// channel count differs, resampling otherwise.
///
/// # Errors
///
/// Returns `MediaKitError::Configuration` for unsupported channel conversions, or when the
/// sample rates differ and resampling support is not compiled in.
pub fn create_processor(
    params: AudioParams,
    config: &ResamplerConfig,
) -> Result<Box<dyn AudioProcessor>> {
    if params.is_identity() {
        return Ok(Box::new(PassthroughAudioProcessor::new(params.target_channels)));
    }
    if params.source_sample_rate == params.target_sample_rate {
        return Ok(Box::new(ChannelMixingProcessor::new(params)?));
    }
    create_resampler(params, config)
}

#[cfg(feature = "audio_resampler")]
fn create_resampler(
    params: AudioParams,
    config: &ResamplerConfig,
) -> Result<Box<dyn AudioProcessor>> {
    tracing::debug!(
        "Creating resampler: {}Hz/{}ch → {}Hz/{}ch, ratio: {:.4}, chunk_frames: {}",
        params.source_sample_rate,
        params.source_channels,
        params.target_sample_rate,
        params.target_channels,
        params.sampling_ratio(),
        config.chunk_frames
    );
    Ok(Box::new(super::resampler::ResamplingProcessor::new(params, config)?))
}

#[cfg(not(feature = "audio_resampler"))]
fn create_resampler(
    params: AudioParams,
    _config: &ResamplerConfig,
) -> Result<Box<dyn AudioProcessor>> {
    Err(MediaKitError::Configuration(format!(
        "sample rate conversion {}Hz → {}Hz requires the audio_resampler feature",
        params.source_sample_rate, params.target_sample_rate
    )))
}
