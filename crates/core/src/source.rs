// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Source reader contract.
//!
//! A source exposes its tracks and a single pull cursor over interleaved samples. Several track
//! transcoders may share one source; each only consumes samples whose
//! [`MediaSource::sample_track_index`] matches its own track.

use crate::buffer::ByteBuffer;
use crate::error::{MediaKitError, Result};
use crate::format::MediaFormat;
use crate::types::{BufferFlags, MediaRange};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    #[default]
    PreviousSync,
    NextSync,
    ClosestSync,
}

pub trait MediaSource: Send {
    fn track_count(&self) -> usize;

    fn track_format(&self, track: usize) -> Option<MediaFormat>;

    fn select_track(&mut self, track: usize);

    fn seek_to(&mut self, position_us: i64, mode: SeekMode);

    /// Track of the sample under the cursor, `None` once the source is exhausted.
    fn sample_track_index(&self) -> Option<usize>;

    /// Copy the current sample into `buffer` starting at offset 0, leaving
    /// `position = 0, limit = bytes`. Returns `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample does not fit or the read fails.
    fn read_sample_data(&mut self, buffer: &mut ByteBuffer) -> Result<Option<usize>>;

    fn sample_time(&self) -> i64;

    /// Flags of the current sample; `END_OF_STREAM` once exhausted.
    fn sample_flags(&self) -> BufferFlags;

    fn advance(&mut self);

    /// Idempotent.
    fn release(&mut self);

    fn selection(&self) -> MediaRange {
        MediaRange::default()
    }

    /// Size of the underlying media in bytes, when known.
    fn size(&self) -> Option<u64> {
        None
    }
}

/// A source shared between the transcoders of one job.
pub type SharedSource = Arc<Mutex<dyn MediaSource>>;

pub fn shared_source<S: MediaSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(source))
}

/// # Errors
///
/// Returns `MediaKitError::Source` if another thread panicked while holding the lock.
pub fn lock_source(source: &SharedSource) -> Result<MutexGuard<'_, dyn MediaSource + 'static>> {
    source.lock().map_err(|_| MediaKitError::Source("source lock poisoned".to_string()))
}
