// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! MediaKit Codecs - concrete pipeline stages built on `mediakit-core`.
//!
//! - [`passthrough`]: software decoder/encoder pair over a fixed frame arena
//! - [`audio`]: PCM processors, the buffer-based audio renderer and buffer filters
//! - [`video`]: the surface-based video renderer, its VP matrix and frame dropping
//! - [`containers`]: WAV and track-synchronized muxer targets, the symphonia PCM source
//! - `test_utils`: doubles for pipeline tests (feature `test-utils`)

pub mod audio;
pub mod containers;
pub mod passthrough;
pub mod video;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
