// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared defaults for track transcoders and transformation jobs.
//!
//! The CLI configuration and [`crate::TransformerConfig`] reference these constants so that
//! defaults stay consistent across the workspace.

use std::time::Duration;

// === Progress Reporting ===

/// Default progress granularity: report in steps of 1/100.
///
/// A granularity of `N` reports job progress only once it advanced by at least `1/N` since
/// the last report. `0` reports every change.
pub const DEFAULT_PROGRESS_GRANULARITY: u32 = 100;

// === Codec Polling ===

/// Timeout handed to codec dequeue calls from the tick loop.
///
/// Zero keeps every tick non-blocking so cancellation is noticed promptly.
pub const CODEC_POLL_TIMEOUT: Duration = Duration::ZERO;

// === Buffers ===

/// Sample buffer size for passthrough tracks whose format does not declare `max-input-size`.
pub const DEFAULT_PASSTHROUGH_BUFFER_SIZE: usize = 1024 * 1024;

/// Default capacity of each passthrough codec buffer used by `mkit transform`.
///
/// At 48kHz stereo 16-bit PCM, 16KiB holds roughly 85ms of audio.
pub const DEFAULT_CODEC_BUFFER_CAPACITY: usize = 16 * 1024;

// === Disk Space ===

/// Safety margin added on top of the estimated output size, in percent.
pub const DISK_SPACE_PADDING_PERCENT: u64 = 10;
