// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use mediakit_core::{config_helpers, pcm, BufferFilter, Frame, MediaFormat, MediaKitError, Result};
use serde::{Deserialize, Serialize};

const BASE: f64 = 10.0;

/// The configuration struct for the VolumeFilter.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VolumeFilterConfig {
    /// Logarithmic volume: 0.0 = mute, 1.0 = unchanged, values above 1.0 amplify.
    /// Valid range: 0.0 to 2.0
    pub volume: f64,
}

impl Default for VolumeFilterConfig {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

impl VolumeFilterConfig {
    /// Validate the volume parameter is within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is outside the range [0.0, 2.0] or is NaN/infinite.
    pub fn validate(&self) -> std::result::Result<(), String> {
        const MIN_VOLUME: f64 = 0.0;
        const MAX_VOLUME: f64 = 2.0;

        if !self.volume.is_finite() {
            return Err(format!("Volume must be a finite number, got: {}", self.volume));
        }

        if self.volume < MIN_VOLUME || self.volume > MAX_VOLUME {
            return Err(format!(
                "Volume must be between {} and {}, got: {}",
                MIN_VOLUME, MAX_VOLUME, self.volume
            ));
        }

        Ok(())
    }

    /// Linear multiplier for this volume: `(10^v - 1) / 9`.
    pub fn multiplier(&self) -> f64 {
        (BASE.powf(self.volume) - 1.0) / (BASE - 1.0)
    }
}

/// Scales 16-bit PCM samples in place, saturating at the sample range.
#[derive(Debug)]
pub struct VolumeFilter {
    multiplier: f64,
}

impl VolumeFilter {
    /// # Errors
    ///
    /// Returns `MediaKitError::Configuration` if the volume is out of range.
    pub fn new(config: &VolumeFilterConfig) -> Result<Self> {
        config.validate().map_err(MediaKitError::Configuration)?;
        Ok(Self { multiplier: config.multiplier() })
    }

    /// Build from JSON parameters such as `{"volume": 0.5}`; missing parameters keep the level.
    ///
    /// # Errors
    ///
    /// Returns `MediaKitError::Configuration` if the volume is out of range.
    pub fn from_params(params: Option<&serde_json::Value>) -> Result<Self> {
        let config: VolumeFilterConfig = config_helpers::parse_config_optional(params)?;
        Self::new(&config)
    }
}

impl BufferFilter for VolumeFilter {
    fn init(&mut self, _format: &MediaFormat) -> Result<()> {
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply(&mut self, frame: &mut Frame) {
        let offset = frame.sample.offset as usize;
        let storage = frame.buffer.storage_mut();
        let end = offset.saturating_add(frame.sample.size as usize).min(storage.len());
        let Some(payload) = storage.get_mut(offset.min(end)..end) else { return };

        for pair in payload.chunks_exact_mut(pcm::BYTES_PER_SAMPLE) {
            let sample = f64::from(i16::from_le_bytes([pair[0], pair[1]]));
            let scaled = (sample * self.multiplier).clamp(f64::from(i16::MIN), f64::from(i16::MAX));
            pair.copy_from_slice(&(scaled as i16).to_le_bytes());
        }
    }

    fn release(&mut self) {}
}
