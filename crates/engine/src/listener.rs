// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Job lifecycle callbacks and their delivery.
//!
//! Jobs run on their own worker threads. A [`ListenerDispatcher`] decouples the listener from
//! those threads: with [`CallbackContext::Runtime`] every event is queued on an unbounded
//! channel and delivered, in order, by a task on the caller's tokio runtime.

use mediakit_core::{MediaKitError, TrackTransformationInfo};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives lifecycle events of transformation jobs.
///
/// Exactly one of `on_completed`, `on_cancelled` or `on_error` is delivered per started job,
/// always last.
pub trait TransformationListener: Send + Sync {
    fn on_started(&self, _job_id: &str) {}

    /// Job progress in `[0, 1]`, throttled by the job's progress granularity.
    fn on_progress(&self, _job_id: &str, _progress: f32) {}

    fn on_completed(&self, job_id: &str, stats: &[TrackTransformationInfo]);

    fn on_cancelled(&self, job_id: &str, stats: &[TrackTransformationInfo]);

    fn on_error(&self, job_id: &str, error: &MediaKitError, stats: &[TrackTransformationInfo]);
}

/// Where listener callbacks run.
#[derive(Debug, Clone, Default)]
pub enum CallbackContext {
    /// On the job's worker thread, as events happen.
    #[default]
    Inline,
    /// On a task spawned on this runtime.
    Runtime(tokio::runtime::Handle),
}

/// An owned listener event, queued for delivery.
#[derive(Debug)]
pub enum ListenerEvent {
    Started { job_id: String },
    Progress { job_id: String, progress: f32 },
    Completed { job_id: String, stats: Vec<TrackTransformationInfo> },
    Cancelled { job_id: String, stats: Vec<TrackTransformationInfo> },
    Error { job_id: String, error: MediaKitError, stats: Vec<TrackTransformationInfo> },
}

impl ListenerEvent {
    pub fn deliver(&self, listener: &dyn TransformationListener) {
        match self {
            Self::Started { job_id } => listener.on_started(job_id),
            Self::Progress { job_id, progress } => listener.on_progress(job_id, *progress),
            Self::Completed { job_id, stats } => listener.on_completed(job_id, stats),
            Self::Cancelled { job_id, stats } => listener.on_cancelled(job_id, stats),
            Self::Error { job_id, error, stats } => listener.on_error(job_id, error, stats),
        }
    }
}

enum Delivery {
    Inline(Arc<dyn TransformationListener>),
    Queued(mpsc::UnboundedSender<ListenerEvent>),
}

/// Delivers events to one listener in the configured [`CallbackContext`].
pub struct ListenerDispatcher {
    delivery: Delivery,
}

impl ListenerDispatcher {
    pub fn new(listener: Arc<dyn TransformationListener>, context: &CallbackContext) -> Self {
        let delivery = match context {
            CallbackContext::Inline => Delivery::Inline(listener),
            CallbackContext::Runtime(handle) => {
                let (tx, mut rx) = mpsc::unbounded_channel::<ListenerEvent>();
                handle.spawn(async move {
                    while let Some(event) = rx.recv().await {
                        event.deliver(listener.as_ref());
                    }
                    tracing::trace!("Listener delivery task finished");
                });
                Delivery::Queued(tx)
            },
        };
        Self { delivery }
    }

    pub fn dispatch(&self, event: ListenerEvent) {
        match &self.delivery {
            Delivery::Inline(listener) => event.deliver(listener.as_ref()),
            Delivery::Queued(tx) => {
                if let Err(e) = tx.send(event) {
                    tracing::warn!(event = ?e.0, "Listener delivery task is gone, dropping event");
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::ThreadId;

    #[derive(Default)]
    struct ThreadRecorder {
        calls: Mutex<Vec<(String, ThreadId)>>,
    }

    impl ThreadRecorder {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push((call.to_string(), std::thread::current().id()));
        }
    }

    impl TransformationListener for ThreadRecorder {
        fn on_started(&self, job_id: &str) {
            self.record(&format!("started:{job_id}"));
        }

        fn on_progress(&self, job_id: &str, progress: f32) {
            self.record(&format!("progress:{job_id}:{progress}"));
        }

        fn on_completed(&self, job_id: &str, _stats: &[TrackTransformationInfo]) {
            self.record(&format!("completed:{job_id}"));
        }

        fn on_cancelled(&self, job_id: &str, _stats: &[TrackTransformationInfo]) {
            self.record(&format!("cancelled:{job_id}"));
        }

        fn on_error(&self, job_id: &str, error: &MediaKitError, _stats: &[TrackTransformationInfo]) {
            self.record(&format!("error:{job_id}:{error}"));
        }
    }

    #[test]
    fn inline_delivery_runs_on_the_caller() {
        let recorder = Arc::new(ThreadRecorder::default());
        let dispatcher = ListenerDispatcher::new(recorder.clone(), &CallbackContext::Inline);
        dispatcher.dispatch(ListenerEvent::Started { job_id: "a".into() });
        dispatcher.dispatch(ListenerEvent::Error {
            job_id: "a".into(),
            error: MediaKitError::Codec("boom".into()),
            stats: Vec::new(),
        });

        let calls = recorder.calls.lock().unwrap();
        let names: Vec<&str> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["started:a", "error:a:Codec error: boom"]);
        assert!(calls.iter().all(|(_, thread)| *thread == std::thread::current().id()));
    }

    #[tokio::test]
    async fn runtime_delivery_preserves_order() {
        let recorder = Arc::new(ThreadRecorder::default());
        let dispatcher =
            ListenerDispatcher::new(recorder.clone(), &CallbackContext::Runtime(tokio::runtime::Handle::current()));

        let worker = std::thread::spawn(move || {
            dispatcher.dispatch(ListenerEvent::Started { job_id: "b".into() });
            dispatcher.dispatch(ListenerEvent::Progress { job_id: "b".into(), progress: 0.5 });
            dispatcher.dispatch(ListenerEvent::Completed { job_id: "b".into(), stats: Vec::new() });
            std::thread::current().id()
        });
        let worker_thread = worker.join().unwrap();

        for _ in 0..500 {
            if recorder.calls.lock().unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let calls = recorder.calls.lock().unwrap();
        let names: Vec<&str> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["started:b", "progress:b:0.5", "completed:b"]);
        assert!(calls.iter().all(|(_, thread)| *thread != worker_thread));
    }
}
