// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! engine: Track transcoders and transformation jobs for MediaKit.
//!
//! A [`MediaTransformer`] runs jobs. Each job owns one [`TrackTranscoder`] per track, drives
//! them on worker threads until every track reaches EOS, and reports to a
//! [`TransformationListener`].

pub mod config;
pub mod constants;
pub mod disk;
pub mod job;
pub mod listener;
pub mod transcoder;
pub mod transformer;

pub use config::TransformerConfig;
pub use job::{JobOutcome, ProgressReporter, TransformationJob};
pub use listener::{CallbackContext, ListenerDispatcher, ListenerEvent, TransformationListener};
pub use transcoder::{
    create_track_transcoder, AudioTrackTranscoder, PassthroughTrackTranscoder, TickResult,
    TrackTransformParams, TrackTranscoder, VideoTrackTranscoder,
};
pub use transformer::MediaTransformer;
