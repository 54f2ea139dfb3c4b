// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A transformation job: every track of one transform, from preparation to the terminal
//! listener callback.
//!
//! A job runs in four phases:
//! 1. prepare: check disk space, build and start one transcoder per track, seek the sources
//! 2. drive: one worker thread per track ticks its transcoder until EOS, error or cancellation
//! 3. release: stop transcoders, release each distinct source and target once
//! 4. report: delete the outputs of an unsuccessful job, then deliver exactly one of
//!    completed, cancelled or error

use crate::config::TransformerConfig;
use crate::disk::{check_available_space, estimate_track_size, selected_duration_us, with_padding};
use crate::listener::{ListenerDispatcher, ListenerEvent};
use crate::transcoder::{create_track_transcoder, TickResult, TrackTransformParams, TrackTranscoder};
use mediakit_core::{
    lock_source, MediaKitError, Result, SeekMode, SharedSource, SharedTarget,
    TransformationStatsCollector, TranscoderError,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// How one track worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackOutcome {
    Completed,
    Interrupted,
}

/// Turns per-track progress into throttled job progress.
#[derive(Debug)]
pub struct ProgressReporter {
    granularity: u32,
    tracks: Vec<f32>,
    last_reported: f32,
}

impl ProgressReporter {
    pub fn new(track_count: usize, granularity: u32) -> Self {
        Self { granularity, tracks: vec![0.0; track_count], last_reported: 0.0 }
    }

    /// Record the progress of `track` and return the job progress when it is due for reporting.
    ///
    /// With granularity 0 every change is due. Otherwise a report needs a step of at least
    /// `1 / granularity` since the last one; reaching 1.0 is always reported.
    #[allow(clippy::cast_precision_loss)]
    pub fn update(&mut self, track: usize, progress: f32) -> Option<f32> {
        if let Some(slot) = self.tracks.get_mut(track) {
            *slot = progress.clamp(0.0, 1.0);
        }
        if self.tracks.is_empty() {
            return None;
        }
        let total = self.tracks.iter().sum::<f32>() / self.tracks.len() as f32;

        let due = if self.granularity == 0 {
            (total - self.last_reported).abs() > f32::EPSILON
        } else {
            let step = 1.0 / self.granularity as f32;
            total - self.last_reported >= step || (total >= 1.0 && self.last_reported < 1.0)
        };
        if due {
            self.last_reported = total;
            Some(total)
        } else {
            None
        }
    }
}

/// Everything a track worker shares with its siblings.
struct TrackDriver<'a> {
    job_id: &'a str,
    abort: &'a CancellationToken,
    reporter: &'a Mutex<ProgressReporter>,
    dispatcher: &'a ListenerDispatcher,
}

impl TrackDriver<'_> {
    /// Tick one transcoder until EOS, failure or cancellation. Returns the time spent in ticks.
    fn drive(&self, index: usize, transcoder: &mut dyn TrackTranscoder) -> (Duration, Result<TrackOutcome>) {
        let mut elapsed = Duration::ZERO;
        loop {
            if self.abort.is_cancelled() {
                tracing::debug!(track = index, "Track interrupted");
                return (elapsed, Ok(TrackOutcome::Interrupted));
            }

            let tick_started = Instant::now();
            let tick = transcoder.process_next_frame();
            elapsed += tick_started.elapsed();

            match tick {
                Ok(TickResult::NotRunning) => {
                    return (elapsed, Err(TranscoderError::TranscoderNotRunning { track: index }.into()));
                },
                Ok(result) => {
                    if let Err(e) = self.report_progress(index, transcoder.progress()) {
                        return (elapsed, Err(e));
                    }
                    if result == TickResult::EosReached {
                        tracing::debug!(track = index, samples = transcoder.samples_written(), "Track reached EOS");
                        return (elapsed, Ok(TrackOutcome::Completed));
                    }
                },
                Err(e) => return (elapsed, Err(e)),
            }
            std::thread::yield_now();
        }
    }

    fn report_progress(&self, index: usize, progress: f32) -> Result<()> {
        let mut reporter = self
            .reporter
            .lock()
            .map_err(|_| MediaKitError::Runtime("progress reporter lock poisoned".to_string()))?;
        // Dispatch under the lock so reported progress stays monotonic across workers.
        if let Some(progress) = reporter.update(index, progress) {
            self.dispatcher.dispatch(ListenerEvent::Progress { job_id: self.job_id.to_string(), progress });
        }
        Ok(())
    }
}

type FinishedHook = Box<dyn FnOnce() + Send>;

/// One transform of one or more tracks, run to completion on the calling thread.
pub struct TransformationJob {
    job_id: String,
    params: Vec<TrackTransformParams>,
    progress_granularity: u32,
    check_disk_space: bool,
    dispatcher: ListenerDispatcher,
    cancel: CancellationToken,
    on_finished: Option<FinishedHook>,
}

impl TransformationJob {
    pub fn new(
        job_id: impl Into<String>,
        params: Vec<TrackTransformParams>,
        config: &TransformerConfig,
        dispatcher: ListenerDispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            params,
            progress_granularity: config.progress_granularity,
            check_disk_space: config.check_disk_space,
            dispatcher,
            cancel,
            on_finished: None,
        }
    }

    /// Run `hook` once the job has released everything, right before the terminal callback.
    #[must_use]
    pub fn on_finished(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_finished = Some(Box::new(hook));
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Run the job to its end and deliver the terminal callback.
    pub fn run(mut self) -> JobOutcome {
        let span = tracing::info_span!("transformation_job", job_id = %self.job_id);
        let _enter = span.enter();

        let params = std::mem::take(&mut self.params);
        let mut stats = TransformationStatsCollector::new();
        for track in &params {
            let format = lock_source(&track.source).ok().and_then(|source| source.track_format(track.source_track));
            stats.add_source_track(format);
        }
        let sources = distinct_sources(&params);
        let targets = distinct_targets(&params);

        let mut transcoders: Vec<Box<dyn TrackTranscoder>> = Vec::with_capacity(params.len());
        let result = self
            .prepare(params, &sources, &targets, &mut transcoders, &mut stats)
            .and_then(|()| self.drive(&mut transcoders, &mut stats));

        for (index, transcoder) in transcoders.iter_mut().enumerate() {
            transcoder.stop();
            stats.set_target_format(index, transcoder.target_media_format());
            stats.add_samples_written(index, transcoder.samples_written());
        }
        for source in &sources {
            match lock_source(source) {
                Ok(mut source) => source.release(),
                Err(e) => tracing::warn!(error = %e, "Could not release source"),
            }
        }
        for target in &targets {
            target.release();
        }

        let outcome = match &result {
            Ok(true) => JobOutcome::Completed,
            Ok(false) => JobOutcome::Cancelled,
            Err(_) => JobOutcome::Failed,
        };
        if outcome != JobOutcome::Completed {
            delete_outputs(&targets);
        }

        if let Some(hook) = self.on_finished.take() {
            hook();
        }

        let job_id = self.job_id.clone();
        let stats = stats.stats();
        match result {
            Ok(true) => {
                tracing::info!("Transformation completed");
                self.dispatcher.dispatch(ListenerEvent::Completed { job_id, stats });
            },
            Ok(false) => {
                tracing::info!("Transformation cancelled");
                self.dispatcher.dispatch(ListenerEvent::Cancelled { job_id, stats });
            },
            Err(error) => {
                tracing::error!(error = %error, "Transformation failed");
                self.dispatcher.dispatch(ListenerEvent::Error { job_id, error, stats });
            },
        }
        outcome
    }

    fn prepare(
        &self,
        params: Vec<TrackTransformParams>,
        sources: &[SharedSource],
        targets: &[SharedTarget],
        transcoders: &mut Vec<Box<dyn TrackTranscoder>>,
        stats: &mut TransformationStatsCollector,
    ) -> Result<()> {
        if params.is_empty() {
            return Err(TranscoderError::NoTracksFound.into());
        }
        if self.check_disk_space {
            check_disk_space(&params, targets)?;
        }

        for track in params {
            transcoders.push(create_track_transcoder(track)?);
        }
        for (index, transcoder) in transcoders.iter_mut().enumerate() {
            transcoder.start()?;
            stats.set_track_codecs(index, transcoder.decoder_name(), transcoder.encoder_name());
            tracing::info!(
                track = index,
                source_track = transcoder.source_track(),
                target_track = transcoder.target_track(),
                decoder = transcoder.decoder_name(),
                encoder = transcoder.encoder_name(),
                "Track transcoder started"
            );
        }
        for source in sources {
            let mut source = lock_source(source)?;
            let start_us = source.selection().start_us;
            source.seek_to(start_us, SeekMode::PreviousSync);
        }

        self.dispatcher.dispatch(ListenerEvent::Started { job_id: self.job_id.clone() });
        Ok(())
    }

    /// Run one worker per track. `Ok(true)` when every track reached EOS, `Ok(false)` when the
    /// job was cancelled first.
    fn drive(
        &self,
        transcoders: &mut [Box<dyn TrackTranscoder>],
        stats: &mut TransformationStatsCollector,
    ) -> Result<bool> {
        // Cancelling the job cancels `abort`; a failing track cancels only `abort`.
        let abort = self.cancel.child_token();
        let reporter = Mutex::new(ProgressReporter::new(transcoders.len(), self.progress_granularity));
        let driver =
            TrackDriver { job_id: &self.job_id, abort: &abort, reporter: &reporter, dispatcher: &self.dispatcher };

        let span = tracing::Span::current();
        let results: Vec<(Duration, Result<TrackOutcome>)> = std::thread::scope(|scope| {
            let driver = &driver;
            let span = &span;
            let handles: Vec<_> = transcoders
                .iter_mut()
                .enumerate()
                .map(|(index, transcoder)| {
                    let spawned = std::thread::Builder::new()
                        .name(format!("mkit-track-{index}"))
                        .spawn_scoped(scope, move || {
                            let _enter = span.enter();
                            let (elapsed, outcome) = driver.drive(index, transcoder.as_mut());
                            if let Err(e) = &outcome {
                                tracing::error!(track = index, error = %e, "Track failed");
                                driver.abort.cancel();
                            }
                            (elapsed, outcome)
                        });
                    if spawned.is_err() {
                        driver.abort.cancel();
                    }
                    spawned
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        (Duration::ZERO, Err(MediaKitError::Runtime("track worker panicked".to_string())))
                    }),
                    Err(e) => {
                        (Duration::ZERO, Err(MediaKitError::Runtime(format!("failed to spawn track worker: {e}"))))
                    },
                })
                .collect()
        });

        let mut first_error = None;
        let mut completed = true;
        for (index, (elapsed, outcome)) in results.into_iter().enumerate() {
            stats.increase_track_processing_duration(index, elapsed);
            match outcome {
                Ok(TrackOutcome::Completed) => {},
                Ok(TrackOutcome::Interrupted) => completed = false,
                Err(e) => {
                    completed = false;
                    first_error.get_or_insert(e);
                },
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }
}

fn distinct_sources(params: &[TrackTransformParams]) -> Vec<SharedSource> {
    let mut sources: Vec<SharedSource> = Vec::new();
    for track in params {
        if !sources.iter().any(|known| std::ptr::addr_eq(Arc::as_ptr(known), Arc::as_ptr(&track.source))) {
            sources.push(Arc::clone(&track.source));
        }
    }
    sources
}

fn distinct_targets(params: &[TrackTransformParams]) -> Vec<SharedTarget> {
    let mut targets: Vec<SharedTarget> = Vec::new();
    for track in params {
        if !targets.iter().any(|known| std::ptr::addr_eq(Arc::as_ptr(known), Arc::as_ptr(&track.target))) {
            targets.push(Arc::clone(&track.target));
        }
    }
    targets
}

/// Compare the padded output estimate of every target with the free space of its volume.
fn check_disk_space(params: &[TrackTransformParams], targets: &[SharedTarget]) -> Result<()> {
    for target in targets {
        let Some(path) = target.output_path() else {
            continue;
        };
        let mut estimated = 0u64;
        for track in params.iter().filter(|t| std::ptr::addr_eq(Arc::as_ptr(&t.target), Arc::as_ptr(target))) {
            let source = lock_source(&track.source)?;
            let format = source.track_format(track.source_track);
            let duration_us = selected_duration_us(format.as_ref().and_then(|f| f.duration_us()), source.selection());
            estimated =
                estimated.saturating_add(estimate_track_size(format.as_ref(), track.target_format.as_ref(), duration_us));
        }
        check_available_space(path, with_padding(estimated))?;
    }
    Ok(())
}

fn delete_outputs(targets: &[SharedTarget]) {
    for path in targets.iter().filter_map(|target| target.output_path()) {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::info!(path = %path.display(), "Deleted partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Could not delete partial output"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn granularity_throttles_reports() {
        let mut reporter = ProgressReporter::new(1, 4);
        assert_eq!(reporter.update(0, 0.1), None);
        assert_eq!(reporter.update(0, 0.25), Some(0.25));
        assert_eq!(reporter.update(0, 0.3), None);
        assert_eq!(reporter.update(0, 0.6), Some(0.6));
        assert_eq!(reporter.update(0, 0.7), None);
        assert_eq!(reporter.update(0, 1.0), Some(1.0));
        assert_eq!(reporter.update(0, 1.0), None);
    }

    #[test]
    fn final_progress_is_always_reported() {
        let mut reporter = ProgressReporter::new(1, 2);
        assert_eq!(reporter.update(0, 0.6), Some(0.6));
        assert_eq!(reporter.update(0, 0.9), None);
        // Less than a step since 0.6, reported anyway.
        assert_eq!(reporter.update(0, 1.0), Some(1.0));
    }

    #[test]
    fn zero_granularity_reports_every_change() {
        let mut reporter = ProgressReporter::new(1, 0);
        assert_eq!(reporter.update(0, 0.01), Some(0.01));
        assert_eq!(reporter.update(0, 0.01), None);
        assert_eq!(reporter.update(0, 0.02), Some(0.02));
    }

    #[test]
    fn progress_averages_tracks() {
        let mut reporter = ProgressReporter::new(2, 0);
        assert_eq!(reporter.update(0, 0.5), Some(0.25));
        assert_eq!(reporter.update(1, 1.0), Some(0.75));
        // Unknown tracks leave the total unchanged.
        assert_eq!(reporter.update(5, 1.0), None);
    }
}
