// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Test utilities for pipeline testing: encoder doubles (recording, fault injecting), an
//! in-memory source and a recording container writer.

use crate::containers::ContainerWriter;
use bytes::Bytes;
use mediakit_core::{
    BufferFlags, ByteBuffer, Dequeued, Encoder, Frame, FrameTag, InputSurface, MediaFormat,
    MediaKitError, MediaRange, MediaSample, MediaSource, Result, SeekMode,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// One input frame queued into a [`RecordingEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub payload: Vec<u8>,
    pub sample: MediaSample,
}

/// Shared, waitable log of encoder submissions.
#[derive(Clone, Default)]
pub struct Submissions {
    inner: Arc<(Mutex<Vec<Submission>>, Condvar)>,
}

impl Submissions {
    fn push(&self, submission: Submission) {
        let (log, changed) = &*self.inner;
        if let Ok(mut log) = log.lock() {
            log.push(submission);
        }
        changed.notify_all();
    }

    /// Wait until at least `count` submissions were recorded or `timeout` passes, then
    /// return everything recorded so far.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Submission> {
        let (log, changed) = &*self.inner;
        let Ok(guard) = log.lock() else { return Vec::new() };
        match changed.wait_timeout_while(guard, timeout, |log| log.len() < count) {
            Ok((log, _)) => log.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Vec<Submission> {
        self.inner.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.0.lock().map(|log| log.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct RecorderState {
    /// Input buffers still available; `None` is unlimited.
    input_budget: Option<usize>,
    next_tag: u32,
    checked_out: HashSet<u32>,
    running: bool,
}

/// Encoder double that records every queued input frame and never produces output.
///
/// Input buffers have a fixed capacity. An optional input budget makes the encoder report
/// `TryAgainLater` once exhausted, until more inputs are granted.
#[derive(Clone)]
pub struct RecordingEncoder {
    capacity: usize,
    state: Arc<Mutex<RecorderState>>,
    submissions: Submissions,
}

impl RecordingEncoder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Arc::new(Mutex::new(RecorderState::default())),
            submissions: Submissions::default(),
        }
    }

    #[must_use]
    pub fn with_input_budget(self, budget: usize) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.input_budget = Some(budget);
        }
        self
    }

    /// Make `count` more input buffers available to a budgeted encoder.
    pub fn grant_inputs(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(budget) = state.input_budget.as_mut() {
                *budget += count;
            }
        }
    }

    pub fn submissions(&self) -> Submissions {
        self.submissions.clone()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RecorderState>> {
        self.state.lock().map_err(|_| MediaKitError::Runtime("recorder lock poisoned".to_string()))
    }
}

impl Encoder for RecordingEncoder {
    fn init(&mut self, _format: &MediaFormat) -> Result<()> {
        Ok(())
    }

    fn create_input_surface(&mut self) -> Option<Box<dyn InputSurface>> {
        None
    }

    fn start(&mut self) -> Result<()> {
        self.lock()?.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.running)
    }

    fn dequeue_input_frame(&mut self, _timeout: Duration) -> Result<Dequeued> {
        let mut state = self.lock()?;
        if let Some(budget) = state.input_budget.as_mut() {
            if *budget == 0 {
                return Ok(Dequeued::TryAgainLater);
            }
            *budget -= 1;
        }
        let tag = state.next_tag;
        state.next_tag = state.next_tag.wrapping_add(1);
        state.checked_out.insert(tag);
        Ok(Dequeued::Frame(FrameTag::new(tag)))
    }

    fn get_input_frame(&mut self, tag: FrameTag) -> Option<Frame> {
        let state = self.state.lock().ok()?;
        state.checked_out.contains(&tag.index()).then(|| {
            Frame::new(tag.index(), ByteBuffer::allocate(self.capacity), MediaSample::default())
        })
    }

    fn queue_input_frame(&mut self, frame: Frame) -> Result<()> {
        if !self.lock()?.checked_out.remove(&frame.tag()) {
            return Err(MediaKitError::Codec(format!("unknown input tag {}", frame.tag())));
        }
        self.submissions.push(Submission { payload: frame.payload().to_vec(), sample: frame.sample });
        Ok(())
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        self.submissions.push(Submission { payload: Vec::new(), sample: MediaSample::end_of_stream() });
        Ok(())
    }

    fn dequeue_output_frame(&mut self, _timeout: Duration) -> Result<Dequeued> {
        Ok(Dequeued::TryAgainLater)
    }

    fn get_output_frame(&mut self, _tag: FrameTag) -> Option<Frame> {
        None
    }

    fn release_output_frame(&mut self, _frame: Frame) -> Result<()> {
        Ok(())
    }

    fn output_format(&self) -> Option<MediaFormat> {
        None
    }

    fn stop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.running = false;
        }
    }

    fn release(&mut self) {
        self.stop();
    }

    fn name(&self) -> &str {
        "RecordingEncoder"
    }
}

/// Which input a [`FaultyEncoder`] rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFault {
    /// The input frame carrying END_OF_STREAM.
    EndOfStreamInput,
    /// Every input frame after the first `n`.
    AfterInputs(usize),
}

/// Wraps an encoder and fails `queue_input_frame` once its fault condition is met. Everything
/// else is delegated.
pub struct FaultyEncoder<E> {
    inner: E,
    fault: EncoderFault,
    accepted: usize,
}

impl<E: Encoder> FaultyEncoder<E> {
    pub const fn new(inner: E, fault: EncoderFault) -> Self {
        Self { inner, fault, accepted: 0 }
    }
}

impl<E: Encoder> Encoder for FaultyEncoder<E> {
    fn init(&mut self, format: &MediaFormat) -> Result<()> {
        self.inner.init(format)
    }

    fn create_input_surface(&mut self) -> Option<Box<dyn InputSurface>> {
        self.inner.create_input_surface()
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn dequeue_input_frame(&mut self, timeout: Duration) -> Result<Dequeued> {
        self.inner.dequeue_input_frame(timeout)
    }

    fn get_input_frame(&mut self, tag: FrameTag) -> Option<Frame> {
        self.inner.get_input_frame(tag)
    }

    fn queue_input_frame(&mut self, frame: Frame) -> Result<()> {
        let rejected = match self.fault {
            EncoderFault::EndOfStreamInput => frame.sample.is_end_of_stream(),
            EncoderFault::AfterInputs(limit) => self.accepted >= limit,
        };
        if rejected {
            return Err(MediaKitError::Codec(format!("injected fault on input {}", self.accepted)));
        }
        self.accepted += 1;
        self.inner.queue_input_frame(frame)
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        if self.fault == EncoderFault::EndOfStreamInput {
            return Err(MediaKitError::Codec("injected fault on end of input".to_string()));
        }
        self.inner.signal_end_of_input_stream()
    }

    fn dequeue_output_frame(&mut self, timeout: Duration) -> Result<Dequeued> {
        self.inner.dequeue_output_frame(timeout)
    }

    fn get_output_frame(&mut self, tag: FrameTag) -> Option<Frame> {
        self.inner.get_output_frame(tag)
    }

    fn release_output_frame(&mut self, frame: Frame) -> Result<()> {
        self.inner.release_output_frame(frame)
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.inner.output_format()
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn release(&mut self) {
        self.inner.release();
    }

    fn name(&self) -> &str {
        "FaultyEncoder"
    }
}

/// One sample of a [`VecMediaSource`] track.
#[derive(Debug, Clone)]
pub struct SourceSample {
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
    pub data: Bytes,
}

impl SourceSample {
    pub fn new(presentation_time_us: i64, data: impl Into<Bytes>) -> Self {
        Self { presentation_time_us, flags: BufferFlags::SYNC, data: data.into() }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags = flags;
        self
    }
}

struct Entry {
    track: usize,
    sample: SourceSample,
}

/// In-memory source. Samples of all tracks are interleaved by presentation time and read
/// through one cursor that only visits selected tracks.
pub struct VecMediaSource {
    formats: Vec<MediaFormat>,
    entries: Vec<Entry>,
    selected: HashSet<usize>,
    cursor: usize,
    selection: MediaRange,
    releases: Arc<AtomicUsize>,
}

impl VecMediaSource {
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
            entries: Vec::new(),
            selected: HashSet::new(),
            cursor: 0,
            selection: MediaRange::default(),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_track(mut self, format: MediaFormat, samples: Vec<SourceSample>) -> Self {
        let track = self.formats.len();
        self.formats.push(format);
        self.entries.extend(samples.into_iter().map(|sample| Entry { track, sample }));
        self.entries.sort_by_key(|entry| entry.sample.presentation_time_us);
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selection: MediaRange) -> Self {
        self.selection = selection;
        self
    }

    /// Counts `release` calls, readable after the source was handed to a job.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }

    fn skip_unselected(&mut self) {
        while self.entries.get(self.cursor).is_some_and(|e| !self.selected.contains(&e.track)) {
            self.cursor += 1;
        }
    }

    fn current(&self) -> Option<&Entry> {
        self.entries.get(self.cursor)
    }
}

impl Default for VecMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSource for VecMediaSource {
    fn track_count(&self) -> usize {
        self.formats.len()
    }

    fn track_format(&self, track: usize) -> Option<MediaFormat> {
        self.formats.get(track).cloned()
    }

    fn select_track(&mut self, track: usize) {
        self.selected.insert(track);
        self.skip_unselected();
    }

    fn seek_to(&mut self, position_us: i64, mode: SeekMode) {
        let selected = |e: &&Entry| self.selected.contains(&e.track);
        let first_after =
            self.entries.iter().position(|e| e.sample.presentation_time_us >= position_us);
        let target = match mode {
            SeekMode::PreviousSync => self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| selected(e) && e.sample.flags.contains(BufferFlags::SYNC))
                .take_while(|(_, e)| e.sample.presentation_time_us <= position_us)
                .last()
                .map(|(i, _)| i)
                .or(first_after),
            SeekMode::NextSync | SeekMode::ClosestSync => first_after,
        };
        self.cursor = target.unwrap_or(self.entries.len());
        self.skip_unselected();
    }

    fn sample_track_index(&self) -> Option<usize> {
        self.current().map(|e| e.track)
    }

    fn read_sample_data(&mut self, buffer: &mut ByteBuffer) -> Result<Option<usize>> {
        let Some(entry) = self.current() else { return Ok(None) };
        if entry.sample.data.len() > buffer.remaining() {
            return Err(MediaKitError::Source(format!(
                "sample of {} bytes does not fit a {} byte buffer",
                entry.sample.data.len(),
                buffer.remaining()
            )));
        }
        Ok(Some(buffer.put_slice(&entry.sample.data)))
    }

    fn sample_time(&self) -> i64 {
        self.current().map_or(-1, |e| e.sample.presentation_time_us)
    }

    fn sample_flags(&self) -> BufferFlags {
        self.current().map_or(BufferFlags::END_OF_STREAM, |e| e.sample.flags)
    }

    fn advance(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
        self.skip_unselected();
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn selection(&self) -> MediaRange {
        self.selection
    }

    fn size(&self) -> Option<u64> {
        Some(self.entries.iter().map(|e| e.sample.data.len() as u64).sum())
    }
}

/// Everything a [`RecordingWriter`] was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterEvent {
    OptionSet { key: String, value: String },
    Stream { index: usize, mime: Option<String> },
    Started,
    Sample { track: usize, data: Vec<u8>, presentation_time_us: i64 },
    Finished,
}

/// Container writer double sharing its event log with the test.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    events: Arc<Mutex<Vec<WriterEvent>>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WriterEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    fn record(&self, event: WriterEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| MediaKitError::Runtime("writer log poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl ContainerWriter for RecordingWriter {
    fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        self.record(WriterEvent::OptionSet { key: key.to_string(), value: value.to_string() })
    }

    fn add_stream(&mut self, index: usize, format: &MediaFormat) -> Result<()> {
        self.record(WriterEvent::Stream { index, mime: format.mime().map(str::to_string) })
    }

    fn start(&mut self) -> Result<()> {
        self.record(WriterEvent::Started)
    }

    fn write_sample(&mut self, track: usize, data: &[u8], sample: &MediaSample) -> Result<()> {
        self.record(WriterEvent::Sample {
            track,
            data: data.to_vec(),
            presentation_time_us: sample.presentation_time_us,
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.record(WriterEvent::Finished)
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
