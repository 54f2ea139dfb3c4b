// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Utility functions shared by codec, renderer and filter implementations.
//!
//! - [`config_helpers`]: Parse component configuration from JSON values
//! - [`pcm`]: 16-bit little-endian PCM arithmetic

use crate::error::MediaKitError;

/// Helper functions for parsing component configuration from JSON values.
pub mod config_helpers {
    use super::MediaKitError;
    use serde::Deserialize;

    /// Parses configuration from an optional JSON value, using defaults if not provided.
    ///
    /// # Errors
    ///
    /// This function always returns `Ok` in practice, as it uses `Default` when parsing fails.
    /// The `Result` return type is maintained for API consistency with other config helpers.
    pub fn parse_config_optional<T>(params: Option<&serde_json::Value>) -> Result<T, MediaKitError>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        Ok(serde_json::from_value(params.unwrap_or(&serde_json::Value::Null).clone())
            .unwrap_or_default())
    }

    /// Parses configuration from an optional JSON value, returning an error if not provided.
    ///
    /// # Errors
    ///
    /// Returns `MediaKitError::Configuration` if `params` is `None` or if deserialization fails.
    pub fn parse_config_required<T>(params: Option<&serde_json::Value>) -> Result<T, MediaKitError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = params
            .ok_or_else(|| MediaKitError::Configuration("Configuration required".to_string()))?
            .clone();
        serde_json::from_value(value)
            .map_err(|e| MediaKitError::Configuration(format!("Failed to parse config: {e}")))
    }
}

/// 16-bit little-endian PCM helpers.
pub mod pcm {
    /// Bytes per sample of 16-bit PCM.
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Bytes per interleaved frame for `channels` channels.
    #[inline]
    pub const fn frame_bytes(channels: usize) -> usize {
        channels * BYTES_PER_SAMPLE
    }

    /// Decode interleaved s16le bytes to normalised floats. A trailing odd byte is ignored.
    pub fn s16le_to_f32(bytes: &[u8], out: &mut Vec<f32>) {
        out.clear();
        out.extend(
            bytes
                .chunks_exact(BYTES_PER_SAMPLE)
                .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0),
        );
    }

    /// Encode a normalised float as s16le, clamping to the 16-bit range.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn f32_to_s16le(sample: f32) -> [u8; 2] {
        let scaled = (sample * 32768.0).round().clamp(-32768.0, 32767.0);
        (scaled as i16).to_le_bytes()
    }

    /// Duration of one sample at `sample_rate`, in microseconds.
    #[inline]
    pub fn sample_duration_us(sample_rate: u32) -> f64 {
        1_000_000.0 / f64::from(sample_rate)
    }
}
