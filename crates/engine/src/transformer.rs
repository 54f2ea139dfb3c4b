// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Job control surface: start, stop and release transformation jobs.

use crate::config::TransformerConfig;
use crate::job::TransformationJob;
use crate::listener::{ListenerDispatcher, TransformationListener};
use crate::transcoder::TrackTransformParams;
use mediakit_core::{MediaKitError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

type JobRegistry = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Runs transformation jobs, each on its own thread, keyed by caller-chosen ids.
pub struct MediaTransformer {
    config: TransformerConfig,
    jobs: JobRegistry,
}

impl Default for MediaTransformer {
    fn default() -> Self {
        Self::new(TransformerConfig::default())
    }
}

impl MediaTransformer {
    pub fn new(config: TransformerConfig) -> Self {
        Self { config, jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub const fn config(&self) -> &TransformerConfig {
        &self.config
    }

    fn lock_jobs(&self) -> Result<MutexGuard<'_, HashMap<String, CancellationToken>>> {
        self.jobs.lock().map_err(|_| MediaKitError::Runtime("job registry lock poisoned".to_string()))
    }

    /// Start a job transforming the tracks in `params`.
    ///
    /// Returns as soon as the job thread is running; the outcome arrives through `listener`.
    ///
    /// # Errors
    ///
    /// Returns `MediaKitError::Configuration` if a job with the same id is still running, or
    /// `MediaKitError::Runtime` if the job thread cannot be spawned.
    pub fn start(
        &self,
        job_id: &str,
        params: Vec<TrackTransformParams>,
        listener: Arc<dyn TransformationListener>,
    ) -> Result<()> {
        let mut jobs = self.lock_jobs()?;
        if jobs.contains_key(job_id) {
            return Err(MediaKitError::Configuration(format!("job '{job_id}' is already running")));
        }

        let cancel = CancellationToken::new();
        let dispatcher = ListenerDispatcher::new(listener, &self.config.callback_context);
        let registry = Arc::clone(&self.jobs);
        let finished_id = job_id.to_string();
        let job = TransformationJob::new(job_id, params, &self.config, dispatcher, cancel.clone()).on_finished(
            move || match registry.lock() {
                Ok(mut jobs) => {
                    jobs.remove(&finished_id);
                },
                Err(_) => tracing::warn!(job_id = %finished_id, "Job registry lock poisoned, job not removed"),
            },
        );

        // The registry stays locked until the job is inserted, so a fast job cannot remove
        // itself before it is registered.
        std::thread::Builder::new()
            .name(format!("mkit-job-{job_id}"))
            .spawn(move || {
                let outcome = job.run();
                tracing::debug!(?outcome, "Job thread exiting");
            })
            .map_err(|e| MediaKitError::Runtime(format!("failed to spawn job thread: {e}")))?;
        jobs.insert(job_id.to_string(), cancel);
        tracing::info!(job_id, "Transformation job started");
        Ok(())
    }

    /// Request cancellation of a job. Unknown or finished ids are ignored.
    ///
    /// Cancellation is cooperative: the job notices it between ticks, then releases its
    /// resources and reports `on_cancelled`.
    pub fn stop(&self, job_id: &str) {
        match self.lock_jobs() {
            Ok(jobs) => match jobs.get(job_id) {
                Some(cancel) => {
                    tracing::info!(job_id, "Stopping transformation job");
                    cancel.cancel();
                },
                None => tracing::debug!(job_id, "No running job to stop"),
            },
            Err(e) => tracing::warn!(job_id, error = %e, "Could not stop job"),
        }
    }

    /// Whether a job with this id is still running.
    pub fn is_running(&self, job_id: &str) -> bool {
        self.lock_jobs().is_ok_and(|jobs| jobs.contains_key(job_id))
    }

    /// Cancel every running job.
    pub fn release(&self) {
        match self.lock_jobs() {
            Ok(jobs) => {
                if !jobs.is_empty() {
                    tracing::info!(count = jobs.len(), "Cancelling all transformation jobs");
                }
                for cancel in jobs.values() {
                    cancel.cancel();
                }
            },
            Err(e) => tracing::warn!(error = %e, "Could not release transformer"),
        }
    }
}
