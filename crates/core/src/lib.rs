// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! MediaKit Core - data model and component contracts for per-track media transforms.
//!
//! A track pipeline moves samples `source → decoder → renderer → encoder → target`. This crate
//! defines the values that travel between those stages and the traits each stage implements:
//!
//! ## Core Modules
//!
//! - [`types`]: MediaSample, BufferFlags, MediaRange, mime types
//! - [`format`]: MediaFormat key/value descriptors
//! - [`buffer`]: ByteBuffer with position/limit cursor
//! - [`buffer_pool`]: reusable scratch buffers
//! - [`frame`]: Frame, FrameTag and dequeue outcomes
//! - [`codec`]: Decoder and Encoder contracts
//! - [`surface`]: decoder-to-renderer texture and encoder input surface
//! - [`filter`]: GlFilter and BufferFilter extension points
//! - [`render`]: Renderer contract
//! - [`source`]: MediaSource reader contract
//! - [`target`]: MediaTarget muxer sink contract
//! - [`state`]: track state machine
//! - [`stats`]: per-track transformation statistics
//! - [`error`]: error taxonomy
//! - [`helpers`]: configuration parsing and PCM helpers

pub mod buffer;
pub mod buffer_pool;
pub mod codec;
pub mod error;
pub mod filter;
pub mod format;
pub mod frame;
pub mod helpers;
pub mod render;
pub mod source;
pub mod state;
pub mod stats;
pub mod surface;
pub mod target;
pub mod types;

// Error handling
pub use error::{MediaKitError, Result, TargetError, TranscoderError};

// Data model
pub use buffer::ByteBuffer;
pub use buffer_pool::{BufferPool, BufferPoolConfig, PoolStats};
pub use format::{keys, FormatValue, MediaFormat};
pub use frame::{Dequeued, Frame, FrameTag};
pub use types::{mime, BufferFlags, MediaRange, MediaSample};

// Component contracts
pub use codec::{lock_encoder, shared_encoder, Decoder, Encoder, SharedEncoder};
pub use filter::{BufferFilter, FrameCanvas, GlFilter, Matrix4};
pub use render::{RenderMode, Renderer};
pub use source::{lock_source, shared_source, MediaSource, SeekMode, SharedSource};
pub use surface::{Image, InputSurface, SurfaceTexture};
pub use target::{MediaTarget, SharedTarget};

// State and statistics
pub use state::{StopReason, TrackState};
pub use stats::{TrackTransformationInfo, TransformationStatsCollector};

pub use helpers::{config_helpers, pcm};
