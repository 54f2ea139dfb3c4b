// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Channel count conversion.
//!
//! Equal counts copy, mono fans out to every target channel and any count folds down to mono
//! by averaging. Other multi-channel conversions have no agreed downmix and are rejected.

use super::processor::{AudioParams, AudioProcessor};
use mediakit_core::{pcm, MediaKitError, Result};

/// Check that `source → target` channels is a supported conversion.
///
/// # Errors
///
/// Returns `MediaKitError::Configuration` for multi-channel to different multi-channel
/// conversions.
pub fn validate_channel_mix(source: u16, target: u16) -> Result<()> {
    if source == target || source == 1 || target == 1 {
        return Ok(());
    }
    Err(MediaKitError::Configuration(format!(
        "unsupported channel conversion: {source} → {target} channels"
    )))
}

/// Remix interleaved `input` from `source` to `target` channels into `out`.
///
/// Callers validate the pair with [`validate_channel_mix`] first; unsupported pairs produce
/// no output.
#[allow(clippy::cast_precision_loss)]
pub fn mix_channels(input: &[f32], source: usize, target: usize, out: &mut Vec<f32>) {
    out.clear();
    if source == target {
        out.extend_from_slice(input);
    } else if source == 1 {
        out.reserve(input.len() * target);
        for &sample in input {
            out.extend(std::iter::repeat_n(sample, target));
        }
    } else if target == 1 {
        out.extend(
            input.chunks_exact(source).map(|frame| frame.iter().sum::<f32>() / source as f32),
        );
    }
}

/// Same-rate processor that only changes the channel layout.
pub struct ChannelMixingProcessor {
    params: AudioParams,
    decoded: Vec<f32>,
    mixed: Vec<f32>,
}

impl ChannelMixingProcessor {
    /// # Errors
    ///
    /// Returns `MediaKitError::Configuration` if the channel pair is unsupported.
    pub fn new(params: AudioParams) -> Result<Self> {
        validate_channel_mix(params.source_channels, params.target_channels)?;
        Ok(Self { params, decoded: Vec::new(), mixed: Vec::new() })
    }
}

impl AudioProcessor for ChannelMixingProcessor {
    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let source_bytes = self.params.source_frame_bytes();
        let frames = (input.len() / source_bytes).min(output.len() / self.params.target_frame_bytes());

        pcm::s16le_to_f32(&input[..frames * source_bytes], &mut self.decoded);
        mix_channels(
            &self.decoded,
            usize::from(self.params.source_channels),
            usize::from(self.params.target_channels),
            &mut self.mixed,
        );
        for (slot, sample) in output.chunks_exact_mut(pcm::BYTES_PER_SAMPLE).zip(&self.mixed) {
            slot.copy_from_slice(&pcm::f32_to_s16le(*sample));
        }
        Ok(frames)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn s16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn params(source_channels: u16, target_channels: u16) -> AudioParams {
        AudioParams {
            source_sample_rate: 8_000,
            source_channels,
            target_sample_rate: 8_000,
            target_channels,
        }
    }

    #[test]
    fn mono_is_duplicated_across_channels() {
        let mut processor = ChannelMixingProcessor::new(params(1, 2)).unwrap();
        let mut output = [0u8; 8];
        let frames = processor.process(&s16(&[1000, -2000]), &mut output).unwrap();
        assert_eq!(frames, 2);
        assert_eq!(output.to_vec(), s16(&[1000, 1000, -2000, -2000]));
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let mut processor = ChannelMixingProcessor::new(params(2, 1)).unwrap();
        let mut output = [0u8; 4];
        let frames = processor.process(&s16(&[1000, 3000, -400, 400]), &mut output).unwrap();
        assert_eq!(frames, 2);
        assert_eq!(output.to_vec(), s16(&[2000, 0]));
    }

    #[test]
    fn output_capacity_bounds_the_frame_count() {
        let mut processor = ChannelMixingProcessor::new(params(1, 2)).unwrap();
        let mut output = [0u8; 4];
        let frames = processor.process(&s16(&[1, 2, 3]), &mut output).unwrap();
        assert_eq!(frames, 1);
    }

    #[test]
    fn surround_downmix_is_rejected() {
        assert!(validate_channel_mix(6, 2).is_err());
        assert!(validate_channel_mix(2, 6).is_err());
        assert!(validate_channel_mix(6, 1).is_ok());
        assert!(ChannelMixingProcessor::new(params(4, 2)).is_err());
    }
}
