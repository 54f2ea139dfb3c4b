// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core value types that flow through a track pipeline.
//!
//! - [`MediaSample`]: byte range + presentation time + [`BufferFlags`] for one unit of media
//! - [`MediaRange`]: the selected time window of a source
//! - [`mime`]: well-known mime types and helpers

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-sample flags carried alongside a buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct BufferFlags: u32 {
        /// The sample is a sync (key) frame.
        const SYNC = 0x0001;
        /// The buffer holds codec configuration data rather than media.
        const CODEC_CONFIG = 0x0002;
        /// No more samples follow on this track.
        const END_OF_STREAM = 0x0004;
    }
}

/// Metadata describing the valid bytes of a buffer.
///
/// `offset`/`size` delimit the payload inside the buffer it travels with. The value is
/// copied or overwritten per frame and is never shared between tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaSample {
    pub offset: u32,
    pub size: u32,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl MediaSample {
    pub const fn new(offset: u32, size: u32, presentation_time_us: i64, flags: BufferFlags) -> Self {
        Self { offset, size, presentation_time_us, flags }
    }

    /// An empty end-of-stream marker.
    pub const fn end_of_stream() -> Self {
        Self { offset: 0, size: 0, presentation_time_us: -1, flags: BufferFlags::END_OF_STREAM }
    }

    pub fn set(&mut self, offset: u32, size: u32, presentation_time_us: i64, flags: BufferFlags) {
        *self = Self::new(offset, size, presentation_time_us, flags);
    }

    #[inline]
    pub const fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    #[inline]
    pub const fn is_codec_config(&self) -> bool {
        self.flags.contains(BufferFlags::CODEC_CONFIG)
    }
}

/// Selected time window of a source, in microseconds. `end_us` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRange {
    pub start_us: i64,
    pub end_us: i64,
}

impl MediaRange {
    pub const fn new(start_us: i64, end_us: i64) -> Self {
        Self { start_us, end_us }
    }

    pub const fn is_valid(&self) -> bool {
        self.end_us >= self.start_us
    }
}

impl Default for MediaRange {
    fn default() -> Self {
        Self { start_us: 0, end_us: i64::MAX }
    }
}

/// Well-known mime types.
pub mod mime {
    pub const AUDIO_RAW: &str = "audio/raw";
    pub const AUDIO_AAC: &str = "audio/mp4a-latm";
    pub const AUDIO_OPUS: &str = "audio/opus";
    pub const VIDEO_RAW: &str = "video/raw";
    pub const VIDEO_AVC: &str = "video/avc";
    pub const VIDEO_HEVC: &str = "video/hevc";
    pub const VIDEO_VP9: &str = "video/x-vnd.on2.vp9";

    pub fn is_audio(mime: &str) -> bool {
        mime.starts_with("audio/")
    }

    pub fn is_video(mime: &str) -> bool {
        mime.starts_with("video/")
    }
}
