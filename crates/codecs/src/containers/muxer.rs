// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Track-synchronized muxer target.
//!
//! Track workers register their output formats independently. Nothing reaches the underlying
//! [`ContainerWriter`] until every expected track has registered: samples written before that
//! point are deep-copied into a FIFO and flushed, in arrival order, right after the writer
//! starts.

use bytes::Bytes;
use indexmap::IndexMap;
use mediakit_core::{
    MediaFormat, MediaKitError, MediaSample, MediaTarget, Result, TargetError,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// A container format writer driven by [`SyncedMuxerTarget`].
///
/// Calls arrive in a fixed order: any `set_option`, then `add_stream` for every track in index
/// order, `start`, any number of `write_sample`, and finally `finish`.
pub trait ContainerWriter: Send {
    fn set_option(&mut self, key: &str, value: &str) -> Result<()>;

    fn add_stream(&mut self, index: usize, format: &MediaFormat) -> Result<()>;

    /// Emit the container header.
    fn start(&mut self) -> Result<()>;

    fn write_sample(&mut self, track: usize, data: &[u8], sample: &MediaSample) -> Result<()>;

    /// Emit the trailer and close the output.
    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Started,
    Released,
}

impl Phase {
    const fn describe(self) -> &'static str {
        match self {
            Self::Collecting => "waiting for tracks",
            Self::Started => "started",
            Self::Released => "released",
        }
    }
}

struct PendingSample {
    track: usize,
    data: Bytes,
    sample: MediaSample,
}

struct MuxerState<W> {
    writer: W,
    phase: Phase,
    /// Set once the writer started; survives release.
    started: bool,
    formats: BTreeMap<usize, MediaFormat>,
    options: IndexMap<String, String>,
    pending: VecDeque<PendingSample>,
}

impl<W: ContainerWriter> MuxerState<W> {
    fn start(&mut self) -> Result<()> {
        for (key, value) in &self.options {
            self.writer.set_option(key, value)?;
        }
        for (index, format) in &self.formats {
            self.writer.add_stream(*index, format)?;
        }
        self.writer.start()?;
        self.phase = Phase::Started;
        self.started = true;

        let flushed = self.pending.len();
        while let Some(pending) = self.pending.pop_front() {
            self.writer.write_sample(pending.track, &pending.data, &pending.sample)?;
        }
        tracing::info!(tracks = self.formats.len(), flushed, "Muxer started");
        Ok(())
    }
}

/// A [`MediaTarget`] that holds writes back until `track_count` tracks have registered.
pub struct SyncedMuxerTarget<W> {
    track_count: usize,
    output_path: Option<PathBuf>,
    state: Mutex<MuxerState<W>>,
}

impl<W: ContainerWriter> SyncedMuxerTarget<W> {
    /// # Errors
    ///
    /// Returns `InvalidParams` when `track_count` is zero.
    pub fn new(writer: W, track_count: usize, output_path: Option<PathBuf>) -> Result<Self> {
        if track_count == 0 {
            return Err(TargetError::InvalidParams("muxer needs at least one track".to_string()).into());
        }
        Ok(Self {
            track_count,
            output_path,
            state: Mutex::new(MuxerState {
                writer,
                phase: Phase::Collecting,
                started: false,
                formats: BTreeMap::new(),
                options: IndexMap::new(),
                pending: VecDeque::new(),
            }),
        })
    }

    /// Set a writer option, applied when the writer starts. A repeated key keeps its first
    /// position and takes the latest value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` once the writer has started or the target was released.
    pub fn add_option(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state.phase != Phase::Collecting {
            return Err(TargetError::InvalidState {
                operation: "add option",
                state: state.phase.describe(),
            }
            .into());
        }
        state.options.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Whether the writer was started. Stays true after release.
    pub fn is_started(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.started)
    }

    /// Samples waiting for the remaining tracks to register.
    pub fn pending_samples(&self) -> usize {
        self.state.lock().map(|state| state.pending.len()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MuxerState<W>>> {
        self.state.lock().map_err(|_| MediaKitError::Runtime("muxer lock poisoned".to_string()))
    }
}

impl<W: ContainerWriter> MediaTarget for SyncedMuxerTarget<W> {
    fn add_track(&self, format: &MediaFormat, target_track: usize) -> Result<usize> {
        let mut state = self.lock()?;
        if state.phase != Phase::Collecting {
            return Err(TargetError::InvalidState {
                operation: "add track",
                state: state.phase.describe(),
            }
            .into());
        }
        if target_track >= self.track_count {
            return Err(TargetError::UnknownTrack(target_track).into());
        }
        if state.formats.contains_key(&target_track) {
            return Err(
                TargetError::TrackRejected(format!("track {target_track} already registered")).into()
            );
        }

        state.formats.insert(target_track, format.clone());
        tracing::debug!(
            track = target_track,
            registered = state.formats.len(),
            expected = self.track_count,
            format = %format,
            "Muxer track registered"
        );
        if state.formats.len() == self.track_count {
            state.start()?;
        }
        Ok(target_track)
    }

    fn write_sample_data(&self, track: usize, buffer: &[u8], sample: &MediaSample) -> Result<()> {
        if track >= self.track_count {
            return Err(TargetError::UnknownTrack(track).into());
        }
        let mut state = self.lock()?;
        match state.phase {
            Phase::Collecting => {
                state.pending.push_back(PendingSample {
                    track,
                    data: Bytes::copy_from_slice(buffer),
                    sample: *sample,
                });
                Ok(())
            },
            Phase::Started => state.writer.write_sample(track, buffer, sample),
            Phase::Released => Err(TargetError::InvalidState {
                operation: "write sample",
                state: Phase::Released.describe(),
            }
            .into()),
        }
    }

    fn release(&self) {
        let Ok(mut state) = self.state.lock() else { return };
        if state.phase == Phase::Started {
            if let Err(e) = state.writer.finish() {
                tracing::warn!(error = %e, "Failed to finish container");
            }
        } else if !state.pending.is_empty() {
            tracing::warn!(
                dropped = state.pending.len(),
                "Muxer released before all tracks registered, dropping queued samples"
            );
        }
        state.pending.clear();
        state.phase = Phase::Released;
    }

    fn track_count(&self) -> usize {
        self.track_count
    }

    fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingWriter, WriterEvent};
    use mediakit_core::{mime, BufferFlags};

    fn sample(pt: i64) -> MediaSample {
        MediaSample::new(0, 1, pt, BufferFlags::SYNC)
    }

    fn written(events: &[WriterEvent]) -> Vec<(usize, Vec<u8>)> {
        events
            .iter()
            .filter_map(|e| match e {
                WriterEvent::Sample { track, data, .. } => Some((*track, data.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn writes_wait_for_every_track() {
        let writer = RecordingWriter::new();
        let muxer = SyncedMuxerTarget::new(writer.clone(), 2, None).unwrap();

        muxer.add_track(&MediaFormat::video(mime::VIDEO_AVC, 2, 2), 1).unwrap();
        let mut scratch = vec![1u8];
        muxer.write_sample_data(1, &scratch, &sample(0)).unwrap();
        // The encoder recycles its buffer right after the write.
        scratch[0] = 9;
        muxer.write_sample_data(1, &[2], &sample(1)).unwrap();
        assert!(writer.events().is_empty());
        assert_eq!(muxer.pending_samples(), 2);

        muxer.add_track(&MediaFormat::raw_audio(48_000, 2), 0).unwrap();
        muxer.write_sample_data(0, &[3], &sample(2)).unwrap();

        let events = writer.events();
        assert_eq!(
            &events[..3],
            &[
                WriterEvent::Stream { index: 0, mime: Some(mime::AUDIO_RAW.to_string()) },
                WriterEvent::Stream { index: 1, mime: Some(mime::VIDEO_AVC.to_string()) },
                WriterEvent::Started,
            ]
        );
        assert_eq!(written(&events), vec![(1, vec![1]), (1, vec![2]), (0, vec![3])]);
        assert!(muxer.is_started());
    }

    #[test]
    fn options_only_before_start() {
        let writer = RecordingWriter::new();
        let muxer = SyncedMuxerTarget::new(writer.clone(), 1, None).unwrap();
        muxer.add_option("movflags", "frag_keyframe").unwrap();
        muxer.add_option("brand", "isom").unwrap();
        muxer.add_option("movflags", "faststart").unwrap();
        muxer.add_track(&MediaFormat::raw_audio(8_000, 1), 0).unwrap();

        let events = writer.events();
        assert_eq!(
            &events[..2],
            &[
                WriterEvent::OptionSet { key: "movflags".into(), value: "faststart".into() },
                WriterEvent::OptionSet { key: "brand".into(), value: "isom".into() },
            ]
        );
        assert!(matches!(
            muxer.add_option("brand", "mp42"),
            Err(MediaKitError::Target(TargetError::InvalidState { .. }))
        ));
    }

    #[test]
    fn rejects_bad_track_registrations() {
        let muxer = SyncedMuxerTarget::new(RecordingWriter::new(), 2, None).unwrap();
        let format = MediaFormat::raw_audio(8_000, 1);
        muxer.add_track(&format, 0).unwrap();
        assert!(matches!(
            muxer.add_track(&format, 0),
            Err(MediaKitError::Target(TargetError::TrackRejected(_)))
        ));
        assert!(matches!(
            muxer.add_track(&format, 2),
            Err(MediaKitError::Target(TargetError::UnknownTrack(2)))
        ));
        assert!(SyncedMuxerTarget::new(RecordingWriter::new(), 0, None).is_err());
    }

    #[test]
    fn release_is_safe_in_any_state() {
        let writer = RecordingWriter::new();
        let muxer = SyncedMuxerTarget::new(writer.clone(), 2, None).unwrap();
        muxer.write_sample_data(0, &[1], &sample(0)).unwrap();
        muxer.release();
        muxer.release();
        assert!(writer.events().is_empty());
        assert!(!muxer.is_started());
        assert!(muxer.write_sample_data(0, &[1], &sample(1)).is_err());

        let writer = RecordingWriter::new();
        let muxer = SyncedMuxerTarget::new(writer.clone(), 1, None).unwrap();
        muxer.add_track(&MediaFormat::raw_audio(8_000, 1), 0).unwrap();
        muxer.release();
        muxer.release();
        assert!(muxer.is_started(), "started is not cleared by release");
        let finished = writer.events().iter().filter(|e| **e == WriterEvent::Finished).count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn concurrent_tracks_all_land_after_start() {
        let writer = RecordingWriter::new();
        let muxer = std::sync::Arc::new(SyncedMuxerTarget::new(writer.clone(), 4, None).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|track| {
                let muxer = std::sync::Arc::clone(&muxer);
                std::thread::spawn(move || {
                    #[allow(clippy::cast_possible_truncation)]
                    let byte = track as u8;
                    muxer.write_sample_data(track, &[byte], &sample(0)).unwrap();
                    muxer.add_track(&MediaFormat::raw_audio(8_000, 1), track).unwrap();
                    muxer.write_sample_data(track, &[byte], &sample(1)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = writer.events();
        let started = events.iter().position(|e| *e == WriterEvent::Started).unwrap();
        assert_eq!(started, 4);
        assert_eq!(written(&events).len(), 8);
    }
}
