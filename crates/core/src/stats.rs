// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-track transformation statistics.
//!
//! A job fills one [`TrackTransformationInfo`] per track as it goes (source format up front,
//! codec names once transcoders exist, target format at release) and hands a snapshot to
//! every terminal listener callback.

use crate::format::MediaFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened to one track of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackTransformationInfo {
    pub source_format: Option<MediaFormat>,
    pub target_format: Option<MediaFormat>,
    pub decoder_codec: Option<String>,
    pub encoder_codec: Option<String>,
    /// Wall time spent inside this track's ticks.
    pub duration_ms: u64,
    /// Samples written to the target.
    pub samples_written: u64,
}

/// Collects [`TrackTransformationInfo`] for a job.
#[derive(Debug, Default, Clone)]
pub struct TransformationStatsCollector {
    tracks: Vec<TrackTransformationInfo>,
}

impl TransformationStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source_track(&mut self, format: Option<MediaFormat>) {
        self.tracks.push(TrackTransformationInfo { source_format: format, ..Default::default() });
    }

    pub fn set_track_codecs(&mut self, track: usize, decoder: &str, encoder: &str) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.decoder_codec = Some(decoder.to_string());
            info.encoder_codec = Some(encoder.to_string());
        }
    }

    pub fn set_target_format(&mut self, track: usize, format: Option<MediaFormat>) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.target_format = format;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn increase_track_processing_duration(&mut self, track: usize, elapsed: Duration) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.duration_ms = info.duration_ms.saturating_add(elapsed.as_millis() as u64);
        }
    }

    pub fn add_samples_written(&mut self, track: usize, count: u64) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.samples_written = info.samples_written.saturating_add(count);
        }
    }

    pub fn stats(&self) -> Vec<TrackTransformationInfo> {
        self.tracks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_per_track_info() {
        let mut collector = TransformationStatsCollector::new();
        collector.add_source_track(Some(MediaFormat::raw_audio(44_100, 2)));
        collector.add_source_track(None);
        collector.set_track_codecs(0, "passthrough", "passthrough");
        collector.increase_track_processing_duration(0, Duration::from_millis(5));
        collector.increase_track_processing_duration(0, Duration::from_millis(7));
        collector.set_target_format(1, Some(MediaFormat::raw_audio(48_000, 1)));
        // Out-of-range tracks are ignored.
        collector.set_track_codecs(9, "a", "b");

        let stats = collector.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].decoder_codec.as_deref(), Some("passthrough"));
        assert_eq!(stats[0].duration_ms, 12);
        assert_eq!(stats[1].target_format.as_ref().and_then(MediaFormat::sample_rate), Some(48_000));
    }
}
