// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PCM media source over any audio file symphonia can read.

use mediakit_core::format::PCM_ENCODING_16BIT;
use mediakit_core::{
    keys, pcm, BufferFlags, ByteBuffer, MediaFormat, MediaKitError, MediaRange, MediaSource,
    Result, SeekMode,
};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

/// Upper bound for one decoded sample when the container does not declare one.
const DEFAULT_MAX_INPUT_SIZE: usize = 64 * 1024;

struct DecodedSample {
    data: Vec<u8>,
    presentation_time_us: i64,
}

/// Decodes the default track of an audio file into interleaved 16-bit PCM samples.
///
/// Exposes a single `audio/raw` track. Each sample is one decoded packet.
pub struct SymphoniaMediaSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    format: MediaFormat,
    sample_buffer: Option<SampleBuffer<i16>>,
    /// Frame capacity of `sample_buffer`.
    sample_buffer_frames: usize,
    current: Option<DecodedSample>,
    selected: bool,
    selection: MediaRange,
    size: Option<u64>,
}

fn source_error(context: &str, e: &Error) -> MediaKitError {
    MediaKitError::Source(format!("{context}: {e}"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn time_to_us(time: Time) -> i64 {
    (time.seconds as i64).saturating_mul(1_000_000) + (time.frac * 1_000_000.0) as i64
}

impl SymphoniaMediaSource {
    /// Probe `path` and prepare its default track for decoding.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened, or a source error if the format is
    /// unsupported or lacks sample rate or channel information.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata().ok().map(|m| m.len());
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| source_error("failed to probe input", &e))?;
        let reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| MediaKitError::Source("no default track".to_string()))?;
        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| MediaKitError::Source("no sample rate found".to_string()))?;
        let channel_count = params
            .channels
            .ok_or_else(|| MediaKitError::Source("no channel info found".to_string()))?
            .count();
        let channels = u32::try_from(channel_count)
            .map_err(|_| MediaKitError::Source(format!("unsupported channel count {channel_count}")))?;

        let max_input_size = params
            .max_frames_per_packet
            .and_then(|frames| usize::try_from(frames).ok())
            .map_or(DEFAULT_MAX_INPUT_SIZE, |frames| frames * pcm::frame_bytes(channel_count));
        let mut format = MediaFormat::raw_audio(sample_rate, channels)
            .with_int(keys::PCM_ENCODING, PCM_ENCODING_16BIT)
            .with_int(keys::MAX_INPUT_SIZE, i64::try_from(max_input_size).unwrap_or(i64::MAX));
        if let Some(frames) = params.n_frames {
            let duration = params.time_base.map_or_else(
                || Time::new(frames / u64::from(sample_rate), 0.0),
                |tb| tb.calc_time(frames),
            );
            format.set_int(keys::DURATION, time_to_us(duration));
        }

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| source_error("failed to create decoder", &e))?;
        let track_id = track.id;
        let time_base = params.time_base;

        tracing::info!(
            path = %path.display(),
            sample_rate,
            channels,
            duration_us = format.duration_us(),
            "Opened audio source"
        );

        Ok(Self {
            track_id,
            time_base,
            reader,
            decoder,
            format,
            sample_buffer: None,
            sample_buffer_frames: 0,
            current: None,
            selected: false,
            selection: MediaRange::default(),
            size,
        })
    }

    #[must_use]
    pub fn with_selection(mut self, selection: MediaRange) -> Self {
        self.selection = selection;
        self
    }

    /// Decode the next packet of our track into `current`, or clear it at the end of the file.
    fn decode_next(&mut self) {
        self.current = None;
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("Reached end of audio source");
                    return;
                },
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Error reading packet, ending source");
                    return;
                },
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::DecodeError(e)) => {
                    tracing::warn!(error = %e, "Decode error (continuing)");
                    continue;
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to decode packet, ending source");
                    return;
                },
            };
            if decoded.frames() == 0 {
                continue;
            }

            if self.sample_buffer.is_none() || decoded.capacity() > self.sample_buffer_frames {
                let spec = *decoded.spec();
                self.sample_buffer = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
                self.sample_buffer_frames = decoded.capacity();
            }
            let Some(buffer) = self.sample_buffer.as_mut() else { return };
            buffer.copy_interleaved_ref(decoded);

            let data = buffer.samples().iter().flat_map(|s| s.to_le_bytes()).collect();
            let presentation_time_us = self.time_base.map_or(0, |tb| time_to_us(tb.calc_time(packet.ts())));
            self.current = Some(DecodedSample { data, presentation_time_us });
            return;
        }
    }
}

impl MediaSource for SymphoniaMediaSource {
    fn track_count(&self) -> usize {
        1
    }

    fn track_format(&self, track: usize) -> Option<MediaFormat> {
        (track == 0).then(|| self.format.clone())
    }

    fn select_track(&mut self, track: usize) {
        if track == 0 && !self.selected {
            self.selected = true;
            self.decode_next();
        }
    }

    fn seek_to(&mut self, position_us: i64, _mode: SeekMode) {
        if !self.selected {
            return;
        }
        let position_us = u64::try_from(position_us).unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let time = Time::new(position_us / 1_000_000, (position_us % 1_000_000) as f64 / 1_000_000.0);
        let seek = SeekTo::Time { time, track_id: Some(self.track_id) };
        match self.reader.seek(symphonia::core::formats::SeekMode::Coarse, seek) {
            Ok(_) => {
                self.decoder.reset();
                self.decode_next();
            },
            Err(e) => tracing::warn!(position_us, error = %e, "Seek failed, keeping position"),
        }
    }

    fn sample_track_index(&self) -> Option<usize> {
        (self.selected && self.current.is_some()).then_some(0)
    }

    fn read_sample_data(&mut self, buffer: &mut ByteBuffer) -> Result<Option<usize>> {
        let Some(current) = self.current.as_ref().filter(|_| self.selected) else {
            return Ok(None);
        };
        if current.data.len() > buffer.remaining() {
            return Err(MediaKitError::Source(format!(
                "decoded sample of {} bytes does not fit a {} byte buffer",
                current.data.len(),
                buffer.remaining()
            )));
        }
        Ok(Some(buffer.put_slice(&current.data)))
    }

    fn sample_time(&self) -> i64 {
        self.current.as_ref().map_or(-1, |c| c.presentation_time_us)
    }

    fn sample_flags(&self) -> BufferFlags {
        if self.current.is_some() {
            BufferFlags::SYNC
        } else {
            BufferFlags::END_OF_STREAM
        }
    }

    fn advance(&mut self) {
        if self.selected && self.current.is_some() {
            self.decode_next();
        }
    }

    fn release(&mut self) {
        self.current = None;
        self.sample_buffer = None;
        self.sample_buffer_frames = 0;
        self.selected = false;
    }

    fn selection(&self) -> MediaRange {
        self.selection
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::containers::WavMediaTarget;
    use mediakit_core::{MediaSample, MediaTarget};

    fn write_wav(path: &Path, sample_rate: u32, channels: u32, pcm: &[u8]) {
        let target = WavMediaTarget::create(path).unwrap();
        target.add_track(&MediaFormat::raw_audio(sample_rate, channels), 0).unwrap();
        let sample = MediaSample::new(0, u32::try_from(pcm.len()).unwrap(), 0, BufferFlags::empty());
        target.write_sample_data(0, pcm, &sample).unwrap();
        target.release();
    }

    fn read_all(source: &mut SymphoniaMediaSource) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buffer = ByteBuffer::allocate(DEFAULT_MAX_INPUT_SIZE);
        while source.sample_track_index() == Some(0) {
            buffer.clear();
            let size = source.read_sample_data(&mut buffer).unwrap().unwrap();
            out.extend_from_slice(&buffer.storage()[..size]);
            source.advance();
        }
        out
    }

    #[test]
    fn reads_back_pcm_written_by_the_wav_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..8_000).map(|i| ((i * 37) % 20_000 - 10_000) as i16).collect();
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        write_wav(&path, 8_000, 2, &pcm);

        let mut source = SymphoniaMediaSource::open(&path).unwrap();
        assert_eq!(source.track_count(), 1);
        let format = source.track_format(0).unwrap();
        assert_eq!(format.sample_rate(), Some(8_000));
        assert_eq!(format.channel_count(), Some(2));
        assert_eq!(format.duration_us(), Some(500_000));
        assert_eq!(source.sample_track_index(), None);

        source.select_track(0);
        assert_eq!(source.sample_time(), 0);
        assert_eq!(read_all(&mut source), pcm);
        assert_eq!(source.sample_time(), -1);
        assert!(source.sample_flags().contains(BufferFlags::END_OF_STREAM));
    }

    #[test]
    fn seeking_restarts_near_the_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8_000, 1, &vec![0u8; 16_000]);

        let mut source = SymphoniaMediaSource::open(&path).unwrap();
        source.select_track(0);
        read_all(&mut source);
        source.seek_to(0, SeekMode::PreviousSync);
        assert_eq!(source.sample_track_index(), Some(0));
        assert_eq!(source.sample_time(), 0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SymphoniaMediaSource::open(dir.path().join("missing.wav")),
            Err(MediaKitError::Io(_))
        ));
    }
}
