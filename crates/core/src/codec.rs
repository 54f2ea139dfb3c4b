// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Decoder and encoder capability contracts.
//!
//! Both sides follow the same tag-based checkout protocol:
//!
//! ```text
//! dequeue_input_frame ──► Frame(tag) ──► get_input_frame(tag) ──► fill ──► queue_input_frame(frame)
//!                                                                                │
//! dequeue_output_frame ◄──────────────────── codec processing ◄──────────────────┘
//!        │
//!        ├─ OutputFormatChanged (once, before data) ──► output_format()
//!        └─ Frame(tag) ──► get_output_frame(tag) ──► consume ──► release_output_frame(frame)
//! ```
//!
//! Dequeue calls never block longer than their timeout and `Duration::ZERO` is a pure poll.
//! `is_running` reflects start/stop only; `release` frees resources and may be called repeatedly.

use crate::error::{MediaKitError, Result};
use crate::format::MediaFormat;
use crate::frame::{Dequeued, Frame, FrameTag};
use crate::surface::{InputSurface, SurfaceTexture};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Decoding side of a track.
pub trait Decoder: Send {
    /// Configure with the source format. With `surface`, decoded frames are drawn into it
    /// when released with `render = true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unsupported or the decoder was released.
    fn init(&mut self, format: &MediaFormat, surface: Option<SurfaceTexture>) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the decoder was not initialised or was released.
    fn start(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// # Errors
    ///
    /// Returns an error if the decoder is in the wrong state.
    fn dequeue_input_frame(&mut self, timeout: Duration) -> Result<Dequeued>;

    fn get_input_frame(&mut self, tag: FrameTag) -> Option<Frame>;

    /// # Errors
    ///
    /// Returns an error if the frame does not belong to a checked-out input slot.
    fn queue_input_frame(&mut self, frame: Frame) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the decoder is in the wrong state.
    fn dequeue_output_frame(&mut self, timeout: Duration) -> Result<Dequeued>;

    fn get_output_frame(&mut self, tag: FrameTag) -> Option<Frame>;

    /// Hand an output frame back. With `render = true` a surface-backed decoder draws the
    /// frame into its surface first; `false` discards it.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame does not belong to a checked-out output slot.
    fn release_output_frame(&mut self, frame: Frame, render: bool) -> Result<()>;

    /// Valid once `OutputFormatChanged` has been observed.
    fn output_format(&self) -> Option<MediaFormat>;

    fn stop(&mut self);

    fn release(&mut self);

    fn name(&self) -> &str;
}

/// Encoding side of a track.
pub trait Encoder: Send {
    /// # Errors
    ///
    /// Returns an error if the target format is unsupported or the encoder was released.
    fn init(&mut self, format: &MediaFormat) -> Result<()>;

    /// A drawable the renderer writes into directly, for surface-backed encoders.
    fn create_input_surface(&mut self) -> Option<Box<dyn InputSurface>>;

    /// # Errors
    ///
    /// Returns an error if the encoder was not initialised or was released.
    fn start(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// # Errors
    ///
    /// Returns an error if the encoder is in the wrong state.
    fn dequeue_input_frame(&mut self, timeout: Duration) -> Result<Dequeued>;

    fn get_input_frame(&mut self, tag: FrameTag) -> Option<Frame>;

    /// # Errors
    ///
    /// Returns an error if the frame does not belong to a checked-out input slot.
    fn queue_input_frame(&mut self, frame: Frame) -> Result<()>;

    /// End the stream for surface-fed encoders.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder is in the wrong state.
    fn signal_end_of_input_stream(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the encoder is in the wrong state.
    fn dequeue_output_frame(&mut self, timeout: Duration) -> Result<Dequeued>;

    fn get_output_frame(&mut self, tag: FrameTag) -> Option<Frame>;

    /// # Errors
    ///
    /// Returns an error if the frame does not belong to a checked-out output slot.
    fn release_output_frame(&mut self, frame: Frame) -> Result<()>;

    fn output_format(&self) -> Option<MediaFormat>;

    fn stop(&mut self);

    fn release(&mut self);

    fn name(&self) -> &str;
}

/// An encoder shared between the track pipeline (output side) and a renderer's consumer
/// thread (input side).
pub type SharedEncoder = Arc<Mutex<dyn Encoder>>;

pub fn shared_encoder<E: Encoder + 'static>(encoder: E) -> SharedEncoder {
    Arc::new(Mutex::new(encoder))
}

/// Lock a shared encoder, mapping poisoning to a codec error.
///
/// # Errors
///
/// Returns `MediaKitError::Codec` if another thread panicked while holding the lock.
pub fn lock_encoder(encoder: &SharedEncoder) -> Result<MutexGuard<'_, dyn Encoder + 'static>> {
    encoder.lock().map_err(|_| MediaKitError::Codec("encoder lock poisoned".to_string()))
}
