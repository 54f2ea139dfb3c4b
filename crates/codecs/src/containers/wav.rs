// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Single-track WAV file target.

use mediakit_core::format::PCM_ENCODING_16BIT;
use mediakit_core::{
    keys, mime, MediaFormat, MediaKitError, MediaSample, MediaTarget, Result, TargetError,
};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Size of the canonical RIFF/WAVE header.
pub const WAV_HEADER_SIZE: u64 = 44;

/// Offset of the RIFF chunk size field.
const RIFF_SIZE_OFFSET: u64 = 4;
/// Offset of the data subchunk size field.
const DATA_SIZE_OFFSET: u64 = 40;

const BITS_PER_SAMPLE: u16 = 16;

/// Canonical 44-byte PCM header with both size fields left as zero.
fn wav_header(channels: u16, sample_rate: u32) -> [u8; 44] {
    let block_align = channels.saturating_mul(BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate.saturating_mul(u32::from(block_align));

    let mut header = [0u8; 44];
    header[0..4].copy_from_slice(b"RIFF");
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header
}

struct WavState {
    writer: Option<BufWriter<File>>,
    track_added: bool,
    /// Bytes written so far, header included.
    written: u64,
    released: bool,
}

/// Writes one raw 16-bit PCM track into a WAV file.
///
/// The header goes out when the track is added, with both size fields zeroed; `release` patches
/// them from the final file length.
pub struct WavMediaTarget {
    path: PathBuf,
    size_limit: u64,
    state: Mutex<WavState>,
}

impl WavMediaTarget {
    /// Create (or truncate) the output file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            size_limit: u64::from(u32::MAX),
            state: Mutex::new(WavState {
                writer: Some(BufWriter::new(file)),
                track_added: false,
                written: 0,
                released: false,
            }),
        })
    }

    /// Lower the maximum file size. The size fields cap it at `u32::MAX` bytes.
    #[must_use]
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit.min(u64::from(u32::MAX));
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, WavState>> {
        self.state.lock().map_err(|_| MediaKitError::Runtime("wav target lock poisoned".to_string()))
    }

    fn validate(format: &MediaFormat) -> Result<(u16, u32)> {
        if format.mime() != Some(mime::AUDIO_RAW) {
            return Err(TargetError::InvalidParams(format!(
                "WAV accepts {} only, got {}",
                mime::AUDIO_RAW,
                format.mime().unwrap_or("no mime type")
            ))
            .into());
        }
        if let Some(encoding) = format.get_int(keys::PCM_ENCODING) {
            if encoding != PCM_ENCODING_16BIT {
                return Err(TargetError::InvalidParams(format!(
                    "WAV accepts 16-bit PCM only, got encoding {encoding}"
                ))
                .into());
            }
        }
        let channels = format
            .channel_count()
            .and_then(|c| u16::try_from(c).ok())
            .filter(|c| *c > 0)
            .ok_or_else(|| TargetError::InvalidParams("missing channel count".to_string()))?;
        let sample_rate = format
            .sample_rate()
            .filter(|r| *r > 0)
            .ok_or_else(|| TargetError::InvalidParams("missing sample rate".to_string()))?;
        Ok((channels, sample_rate))
    }
}

/// Patch both size fields from the current file length and flush.
fn finalize(writer: &mut BufWriter<File>) -> std::io::Result<u64> {
    writer.flush()?;
    let file = writer.get_mut();
    let length = file.seek(SeekFrom::End(0))?;
    let riff_size = u32::try_from(length.saturating_sub(8)).unwrap_or(u32::MAX);
    let data_size = u32::try_from(length.saturating_sub(WAV_HEADER_SIZE)).unwrap_or(u32::MAX);

    file.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
    file.write_all(&riff_size.to_le_bytes())?;
    file.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
    file.write_all(&data_size.to_le_bytes())?;
    file.sync_all()?;
    Ok(length)
}

fn release_state(state: &mut WavState, path: &Path) {
    if state.released {
        return;
    }
    state.released = true;
    let Some(mut writer) = state.writer.take() else { return };
    if !state.track_added {
        return;
    }
    match finalize(&mut writer) {
        Ok(length) => tracing::info!(path = %path.display(), length, "WAV file finalized"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to finalize WAV file"),
    }
}

impl MediaTarget for WavMediaTarget {
    fn add_track(&self, format: &MediaFormat, _target_track: usize) -> Result<usize> {
        let mut state = self.lock()?;
        if state.released {
            return Err(TargetError::InvalidState { operation: "add track", state: "released" }.into());
        }
        if state.track_added {
            return Err(TargetError::TrackRejected("WAV holds a single track".to_string()).into());
        }
        let (channels, sample_rate) = Self::validate(format)?;
        let writer = state
            .writer
            .as_mut()
            .ok_or(TargetError::InvalidState { operation: "add track", state: "closed" })?;
        writer.write_all(&wav_header(channels, sample_rate))?;
        state.written = WAV_HEADER_SIZE;
        state.track_added = true;
        tracing::debug!(channels, sample_rate, path = %self.path.display(), "WAV track added");
        Ok(0)
    }

    fn write_sample_data(&self, track: usize, buffer: &[u8], _sample: &MediaSample) -> Result<()> {
        let mut state = self.lock()?;
        if state.released {
            return Err(TargetError::InvalidState { operation: "write sample", state: "released" }.into());
        }
        if !state.track_added {
            return Err(
                TargetError::InvalidState { operation: "write sample", state: "no track added" }.into()
            );
        }
        if track != 0 {
            return Err(TargetError::UnknownTrack(track).into());
        }

        let total = state.written.saturating_add(buffer.len() as u64);
        if total > self.size_limit {
            release_state(&mut state, &self.path);
            return Err(TargetError::SizeLimitExceeded { limit: self.size_limit }.into());
        }
        let writer = state
            .writer
            .as_mut()
            .ok_or(TargetError::InvalidState { operation: "write sample", state: "closed" })?;
        writer.write_all(buffer)?;
        state.written = total;
        Ok(())
    }

    fn release(&self) {
        if let Ok(mut state) = self.state.lock() {
            release_state(&mut state, &self.path);
        }
    }

    fn track_count(&self) -> usize {
        1
    }

    fn output_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl Drop for WavMediaTarget {
    fn drop(&mut self) {
        self.release();
    }
}
