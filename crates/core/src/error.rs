// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for MediaKit.
//!
//! Errors are split by who is at fault:
//! - [`TranscoderError`]: protocol violations between a track's decoder, renderer and encoder.
//!   These abort only the affected job.
//! - [`TargetError`]: a muxer sink used in the wrong lifecycle state or with bad parameters.
//! - everything else ([`MediaKitError`] variants) covers configuration, codec, I/O and
//!   resource problems.
//!
//! Transient conditions (`TRY_AGAIN_LATER`) are never errors; they are modelled as
//! [`crate::frame::Dequeued::TryAgainLater`] and simply retried.

use thiserror::Error;

/// Main error type for MediaKit operations.
#[derive(Debug, Error)]
pub enum MediaKitError {
    /// Configuration or parameter validation error.
    ///
    /// Examples:
    /// - Unsupported channel mixing (e.g. 6 -> 2 channels)
    /// - Volume outside of `[0, 1]`
    /// - Missing sample rate in a target audio format
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Runtime processing error during normal operation.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Codec-specific error (lifecycle misuse, unknown tag, format negotiation).
    #[error("Codec error: {0}")]
    Codec(String),

    /// Renderer or filter failure.
    #[error("Render error: {0}")]
    Render(String),

    /// Media source failure (probe, read, seek).
    #[error("Source error: {0}")]
    Source(String),

    /// Frame exchange protocol violation for a track.
    #[error("Track transcoder error: {0}")]
    Transcoder(#[from] TranscoderError),

    /// Media target (muxer sink) failure.
    #[error("Media target error: {0}")]
    Target(#[from] TargetError),

    /// The output volume does not have room for the estimated target size.
    #[error("Insufficient disk space: estimated {estimated} bytes, available {available} bytes")]
    InsufficientDiskSpace { estimated: u64, available: u64 },

    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol violations detected while driving a track pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscoderError {
    /// A dequeue call returned a tag but the codec had no frame behind it.
    #[error("no frame available for a tag the codec reported as ready")]
    NoFrameAvailable,
    #[error("no tracks found")]
    NoTracksFound,
    #[error("decoder not provided")]
    DecoderNotProvided,
    #[error("encoder not provided")]
    EncoderNotProvided,
    #[error("renderer not provided")]
    RendererNotProvided,
    #[error("source track mime type not found")]
    SourceTrackMimeTypeNotFound,
    /// The renderer cannot drive the media type of the track it was paired with.
    #[error("renderer is incompatible with track of type {mime}")]
    IncompatibleRenderer { mime: String },
    #[error("media range end is before its start")]
    InvalidMediaRange,
    #[error("transcoder for track {track} is not running")]
    TranscoderNotRunning { track: usize },
    #[error("{codec} was used after release")]
    CodecInReleasedState { codec: String },
}

/// Errors reported by media targets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// Operation not allowed in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: &'static str },
    #[error("track rejected: {0}")]
    TrackRejected(String),
    #[error("output would exceed the {limit} byte size limit")]
    SizeLimitExceeded { limit: u64 },
    #[error("unknown track {0}")]
    UnknownTrack(usize),
}

/// Convenience type alias for Results using `MediaKitError`.
pub type Result<T> = std::result::Result<T, MediaKitError>;

impl From<MediaKitError> for String {
    fn from(err: MediaKitError) -> Self {
        err.to_string()
    }
}

// Generic string errors default to Runtime
impl From<String> for MediaKitError {
    fn from(s: String) -> Self {
        Self::Runtime(s)
    }
}

impl From<&str> for MediaKitError {
    fn from(s: &str) -> Self {
        Self::Runtime(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MediaKitError::Configuration("Invalid sample rate".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid sample rate");

        let err: MediaKitError = TranscoderError::TranscoderNotRunning { track: 1 }.into();
        assert_eq!(err.to_string(), "Track transcoder error: transcoder for track 1 is not running");

        let err: MediaKitError =
            TargetError::InvalidState { operation: "add option", state: "started" }.into();
        assert_eq!(err.to_string(), "Media target error: cannot add option while started");
    }

    #[test]
    fn test_string_to_error_conversion() {
        let err: MediaKitError = "Something went wrong".into();
        assert_eq!(err.to_string(), "Runtime error: Something went wrong");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: MediaKitError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("File not found"));
    }
}
