// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Muxer sink contract.
//!
//! Targets are shared by every track worker of a job, so all methods take `&self` and
//! implementations serialise access internally.

use crate::error::Result;
use crate::format::MediaFormat;
use crate::types::MediaSample;
use std::path::Path;
use std::sync::Arc;

pub trait MediaTarget: Send + Sync {
    /// Register a track's format at `target_track`; returns the index to write to.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is rejected or the target is in the wrong state.
    fn add_track(&self, format: &MediaFormat, target_track: usize) -> Result<usize>;

    /// Write `sample.size` bytes starting at `sample.offset` of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, an unknown track, or a write after release.
    fn write_sample_data(&self, track: usize, buffer: &[u8], sample: &MediaSample) -> Result<()>;

    /// Finish the output. Safe to call repeatedly and whether or not writing started.
    fn release(&self);

    fn track_count(&self) -> usize;

    /// Path of the file this target writes, if any. Deleted when a job fails.
    fn output_path(&self) -> Option<&Path>;
}

pub type SharedTarget = Arc<dyn MediaTarget>;
