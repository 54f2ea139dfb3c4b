// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Output size estimation and free-space lookup.

use crate::constants::DISK_SPACE_PADDING_PERCENT;
use mediakit_core::{mime, MediaFormat, MediaKitError, MediaRange, Result};
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Length of the part of a track that falls inside `range`.
pub fn selected_duration_us(track_duration_us: Option<i64>, range: MediaRange) -> i64 {
    let end_us = track_duration_us.map_or(range.end_us, |duration| duration.min(range.end_us));
    end_us.saturating_sub(range.start_us).max(0)
}

/// Bits per second of `format`: its declared bitrate, or the raw PCM rate for 16-bit audio.
fn bits_per_second(format: &MediaFormat) -> Option<u64> {
    if let Some(bit_rate) = format.bit_rate().and_then(|rate| u64::try_from(rate).ok()).filter(|r| *r > 0) {
        return Some(bit_rate);
    }
    if format.mime() == Some(mime::AUDIO_RAW) {
        let rate = u64::from(format.sample_rate()?);
        let channels = u64::from(format.channel_count()?);
        return Some(rate * channels * 16);
    }
    None
}

/// Estimated bytes one track contributes to the output.
///
/// Uses the target format's rate when known, else the source's. Tracks with no known rate
/// contribute nothing.
pub fn estimate_track_size(source: Option<&MediaFormat>, target: Option<&MediaFormat>, duration_us: i64) -> u64 {
    let Some(bits) = target.and_then(bits_per_second).or_else(|| source.and_then(bits_per_second)) else {
        return 0;
    };
    let duration_us = u64::try_from(duration_us).unwrap_or(0);
    // bits/s * us / 8 bits / 1e6 us
    u64::try_from(u128::from(bits) * u128::from(duration_us) / 8_000_000).unwrap_or(u64::MAX)
}

/// Add the safety padding to a raw estimate.
pub fn with_padding(estimated: u64) -> u64 {
    let padded = u128::from(estimated) * u128::from(100 + DISK_SPACE_PADDING_PERCENT) / 100;
    u64::try_from(padded).unwrap_or(u64::MAX)
}

/// Free bytes on the volume that holds `path`, or `None` when it cannot be determined.
///
/// `path` need not exist yet; its closest existing ancestor picks the volume.
pub fn available_space(path: &Path) -> Option<u64> {
    let resolved = existing_ancestor(path)?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(sysinfo::Disk::available_space)
}

fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() { path.to_path_buf() } else { std::env::current_dir().ok()?.join(path) };
    absolute.ancestors().find_map(|ancestor| ancestor.canonicalize().ok())
}

/// Fail with `InsufficientDiskSpace` when `estimated` bytes (padding included) do not fit on the
/// volume holding `path`. Unknown free space passes.
///
/// # Errors
///
/// Returns `MediaKitError::InsufficientDiskSpace` when the volume is too small.
pub fn check_available_space(path: &Path, estimated: u64) -> Result<()> {
    let Some(available) = available_space(path) else {
        tracing::debug!(path = %path.display(), "Free space unknown, skipping disk space check");
        return Ok(());
    };
    if estimated > available {
        return Err(MediaKitError::InsufficientDiskSpace { estimated, available });
    }
    tracing::debug!(path = %path.display(), estimated, available, "Disk space check passed");
    Ok(())
}
