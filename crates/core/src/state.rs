// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Track pipeline state machine.
//!
//! ## State Machine
//!
//! ```text
//!   Uninitialized
//!         ↓ init codecs & renderer
//!    Initialized
//!         ↓ start()
//!      Running
//!         ↓ EOS extracted from the source
//!     Draining
//!         ↓ EOS out of the encoder
//!      Stopped ←── (any state: cancel, error, release)
//! ```

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

/// Why a track entered the `Stopped` state.
///
/// Serialized as a snake_case string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// EOS reached on both the extract and the encode side.
    Completed,
    /// The owning job was cancelled.
    Cancelled,
    /// A fatal error aborted the track.
    Failed,
    /// A reason not recognized by this version.
    Unknown,
}

impl<'de> Deserialize<'de> for StopReason {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value.as_str()))
    }
}

impl From<&str> for StopReason {
    fn from(value: &str) -> Self {
        match value {
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            "failed" | "error" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Lifecycle state of one track pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    #[default]
    Uninitialized,
    /// Decoder, encoder and renderer are configured.
    Initialized,
    /// Ticks are moving samples through the pipeline.
    Running,
    /// The source is exhausted; remaining frames are flowing out of the codecs.
    Draining,
    Stopped { reason: StopReason },
}

impl TrackState {
    /// Whether `next` is a legal successor of `self`.
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized, Self::Initialized)
                | (Self::Initialized, Self::Running)
                | (Self::Running, Self::Draining)
                | (Self::Draining | Self::Running, Self::Stopped { reason: StopReason::Completed })
                | (
                    Self::Uninitialized | Self::Initialized | Self::Running | Self::Draining,
                    Self::Stopped { reason: StopReason::Cancelled | StopReason::Failed }
                )
        )
    }

    /// Move to `next`, logging and ignoring illegal transitions.
    pub fn advance(&mut self, next: Self) -> bool {
        if self.can_transition_to(&next) {
            tracing::debug!(from = ?self, to = ?next, "Track state transition");
            *self = next;
            true
        } else {
            tracing::warn!(from = ?self, to = ?next, "Ignoring invalid track state transition");
            false
        }
    }

    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Draining)
    }

    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut state = TrackState::default();
        assert!(state.advance(TrackState::Initialized));
        assert!(state.advance(TrackState::Running));
        assert!(state.is_active());
        assert!(state.advance(TrackState::Draining));
        assert!(state.advance(TrackState::Stopped { reason: StopReason::Completed }));
        assert!(state.is_stopped());
    }

    #[test]
    fn rejects_skipping_start() {
        let mut state = TrackState::Initialized;
        assert!(!state.advance(TrackState::Draining));
        assert_eq!(state, TrackState::Initialized);
        assert!(!state.advance(TrackState::Stopped { reason: StopReason::Completed }));
    }

    #[test]
    fn stopped_is_terminal() {
        let mut state = TrackState::Stopped { reason: StopReason::Failed };
        assert!(!state.advance(TrackState::Running));
        assert!(!state.advance(TrackState::Stopped { reason: StopReason::Cancelled }));
    }

    #[test]
    fn stop_reason_parses_leniently() {
        let reason: StopReason = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(reason, StopReason::Cancelled);
        let reason: StopReason = serde_json::from_str("\"exploded\"").unwrap();
        assert_eq!(reason, StopReason::Unknown);
    }
}
