// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media format descriptors.
//!
//! A [`MediaFormat`] maps well-known [`keys`] to typed [`FormatValue`]s. Decoders produce one on
//! their first output (signalled by `OUTPUT_FORMAT_CHANGED`), and the pipeline uses them to
//! initialise encoders and renderers.
//!
//! ```
//! use mediakit_core::format::{keys, MediaFormat};
//! use mediakit_core::types::mime;
//!
//! let format = MediaFormat::audio(mime::AUDIO_RAW, 48_000, 2).with_int(keys::BIT_RATE, 128_000);
//! assert_eq!(format.sample_rate(), Some(48_000));
//! assert_eq!(format.get_int(keys::BIT_RATE), Some(128_000));
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known format keys.
pub mod keys {
    pub const MIME: &str = "mime";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const CHANNEL_COUNT: &str = "channel-count";
    pub const SAMPLE_RATE: &str = "sample-rate";
    pub const BIT_RATE: &str = "bitrate";
    pub const FRAME_RATE: &str = "frame-rate";
    pub const ROTATION: &str = "rotation-degrees";
    pub const DURATION: &str = "durationUs";
    pub const MAX_INPUT_SIZE: &str = "max-input-size";
    pub const PCM_ENCODING: &str = "pcm-encoding";
    pub const CSD_0: &str = "csd-0";
    pub const CSD_1: &str = "csd-1";
}

/// PCM encoding id for signed 16-bit little-endian samples.
pub const PCM_ENCODING_16BIT: i64 = 2;

/// A typed format value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatValue {
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for FormatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Mapping of format keys to typed values. Insertion order is preserved for display.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaFormat {
    values: IndexMap<String, FormatValue>,
}

impl MediaFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio format with mime, sample rate and channel count set.
    pub fn audio(mime: &str, sample_rate: u32, channel_count: u32) -> Self {
        Self::new()
            .with_string(keys::MIME, mime)
            .with_int(keys::SAMPLE_RATE, i64::from(sample_rate))
            .with_int(keys::CHANNEL_COUNT, i64::from(channel_count))
    }

    /// Raw 16-bit little-endian PCM.
    pub fn raw_audio(sample_rate: u32, channel_count: u32) -> Self {
        Self::audio(crate::types::mime::AUDIO_RAW, sample_rate, channel_count)
            .with_int(keys::PCM_ENCODING, PCM_ENCODING_16BIT)
    }

    /// Video format with mime and frame size set.
    pub fn video(mime: &str, width: u32, height: u32) -> Self {
        Self::new()
            .with_string(keys::MIME, mime)
            .with_int(keys::WIDTH, i64::from(width))
            .with_int(keys::HEIGHT, i64::from(height))
    }

    #[must_use]
    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.set_int(key, value);
        self
    }

    #[must_use]
    pub fn with_float(mut self, key: &str, value: f64) -> Self {
        self.set(key, FormatValue::Float(value));
        self
    }

    #[must_use]
    pub fn with_string(mut self, key: &str, value: &str) -> Self {
        self.set(key, FormatValue::String(value.to_string()));
        self
    }

    #[must_use]
    pub fn with_bytes(mut self, key: &str, value: Vec<u8>) -> Self {
        self.set(key, FormatValue::Bytes(value));
        self
    }

    pub fn set(&mut self, key: &str, value: FormatValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.set(key, FormatValue::Int(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<FormatValue> {
        self.values.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FormatValue> {
        self.values.get(key)
    }

    /// Integer value; floats are truncated toward zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(*v),
            FormatValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Numeric value as a float, whichever way it was stored.
    #[allow(clippy::cast_precision_loss)]
    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(*v as f64),
            FormatValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            FormatValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.values.get(key)? {
            FormatValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_int(key).and_then(|v| u32::try_from(v).ok())
    }

    pub fn mime(&self) -> Option<&str> {
        self.get_string(keys::MIME)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.get_u32(keys::SAMPLE_RATE)
    }

    pub fn channel_count(&self) -> Option<u32> {
        self.get_u32(keys::CHANNEL_COUNT)
    }

    pub fn width(&self) -> Option<u32> {
        self.get_u32(keys::WIDTH)
    }

    pub fn height(&self) -> Option<u32> {
        self.get_u32(keys::HEIGHT)
    }

    pub fn rotation(&self) -> Option<i64> {
        self.get_int(keys::ROTATION)
    }

    pub fn bit_rate(&self) -> Option<i64> {
        self.get_int(keys::BIT_RATE)
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.get_number(keys::FRAME_RATE)
    }

    pub fn duration_us(&self) -> Option<i64> {
        self.get_int(keys::DURATION)
    }

    pub fn is_audio(&self) -> bool {
        self.mime().is_some_and(crate::types::mime::is_audio)
    }

    pub fn is_video(&self) -> bool {
        self.mime().is_some_and(crate::types::mime::is_video)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormatValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (key, value)) in self.values.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::mime;

    #[test]
    fn typed_accessors() {
        let format = MediaFormat::video(mime::VIDEO_AVC, 1280, 720)
            .with_float(keys::FRAME_RATE, 29.97)
            .with_int(keys::ROTATION, 90);
        assert_eq!(format.mime(), Some(mime::VIDEO_AVC));
        assert_eq!(format.width(), Some(1280));
        assert_eq!(format.height(), Some(720));
        assert_eq!(format.rotation(), Some(90));
        assert_eq!(format.get_int(keys::FRAME_RATE), Some(29));
        assert!(format.is_video());
        assert!(!format.is_audio());
        assert_eq!(format.sample_rate(), None);
    }

    #[test]
    fn negative_values_are_not_unsigned() {
        let format = MediaFormat::new().with_int(keys::SAMPLE_RATE, -1);
        assert_eq!(format.sample_rate(), None);
    }

    #[test]
    fn display_keeps_insertion_order() {
        let format = MediaFormat::raw_audio(44_100, 1);
        assert_eq!(
            format.to_string(),
            "{mime=audio/raw, sample-rate=44100, channel-count=1, pcm-encoding=2}"
        );
    }

    #[test]
    fn serializes_as_flat_map() {
        let format = MediaFormat::audio(mime::AUDIO_AAC, 48_000, 2);
        let json = serde_json::to_value(&format).unwrap_or_default();
        assert_eq!(json["sample-rate"], 48_000);
        assert_eq!(json["mime"], "audio/mp4a-latm");
    }
}
