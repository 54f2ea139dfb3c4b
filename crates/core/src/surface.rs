// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Drawable surfaces that connect a surface-backed decoder, a renderer and an encoder.
//!
//! ```text
//! decoder.release_output_frame(frame, render = true)
//!          │ posts Image
//!          ▼
//!   SurfaceTexture ──await_new_image──► renderer filter chain ──► FrameCanvas
//!                                                                   │ swap_buffers
//!                                                                   ▼
//!                                                          InputSurface (encoder)
//! ```
//!
//! The GPU side is opaque to the pipeline; these types carry decoded images and the
//! composited result between stages so that the surface protocol can be driven in software.

use crate::error::{MediaKitError, Result};
use bytes::Bytes;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Default time `await_new_image` waits for the decoder to post a frame.
pub const DEFAULT_IMAGE_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// A decoded picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub presentation_time_us: i64,
}

#[derive(Default)]
struct TextureState {
    pending: Option<Image>,
    released: bool,
}

#[derive(Default)]
struct TextureShared {
    state: Mutex<TextureState>,
    image_available: Condvar,
}

/// Receives decoded images from a surface-backed decoder.
///
/// Cloning yields another handle to the same texture: the renderer keeps one, the decoder
/// is initialised with the other.
#[derive(Clone, Default)]
pub struct SurfaceTexture {
    shared: Arc<TextureShared>,
}

impl std::fmt::Debug for SurfaceTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceTexture").finish_non_exhaustive()
    }
}

impl SurfaceTexture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch a new image, replacing one that was never consumed.
    pub fn post(&self, image: Image) {
        let Ok(mut state) = self.shared.state.lock() else { return };
        if state.released {
            return;
        }
        if state.pending.replace(image).is_some() {
            tracing::debug!("Surface texture image overwritten before it was consumed");
        }
        drop(state);
        self.shared.image_available.notify_all();
    }

    /// Block until an image is posted, up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `MediaKitError::Render` on timeout or if the texture was released.
    pub fn await_new_image(&self, timeout: Duration) -> Result<Image> {
        let guard = self
            .shared
            .state
            .lock()
            .map_err(|_| MediaKitError::Render("surface texture lock poisoned".to_string()))?;
        let (mut state, wait) = self
            .shared
            .image_available
            .wait_timeout_while(guard, timeout, |s| s.pending.is_none() && !s.released)
            .map_err(|_| MediaKitError::Render("surface texture lock poisoned".to_string()))?;

        if state.released {
            return Err(MediaKitError::Render("surface texture released".to_string()));
        }
        if wait.timed_out() && state.pending.is_none() {
            return Err(MediaKitError::Render("surface frame wait timed out".to_string()));
        }
        state
            .pending
            .take()
            .ok_or_else(|| MediaKitError::Render("surface frame wait timed out".to_string()))
    }

    pub fn has_pending_image(&self) -> bool {
        self.shared.state.lock().is_ok_and(|s| s.pending.is_some())
    }

    /// Wake any waiter and refuse further images. Idempotent.
    pub fn release(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.released = true;
            state.pending = None;
        }
        self.shared.image_available.notify_all();
    }
}

/// The encoder-side drawable a renderer composites into.
pub trait InputSurface: Send {
    /// Timestamp applied to the next swapped frame.
    fn set_presentation_time(&mut self, presentation_time_ns: i64);

    /// Submit the composited back buffer to the encoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder can no longer accept frames.
    fn swap_buffers(&mut self, back_buffer: &[u8]) -> Result<()>;

    fn release(&mut self);
}
