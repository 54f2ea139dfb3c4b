// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media targets (muxer sinks) and the file-backed media source.

mod muxer;
#[cfg(feature = "symphonia")]
mod source;
mod wav;

pub use muxer::{ContainerWriter, SyncedMuxerTarget};
#[cfg(feature = "symphonia")]
pub use source::SymphoniaMediaSource;
pub use wav::{WavMediaTarget, WAV_HEADER_SIZE};
