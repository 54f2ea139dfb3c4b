// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Filter extension points.
//!
//! - [`GlFilter`]: one draw step in a surface renderer's chain, applied to a [`FrameCanvas`]
//! - [`BufferFilter`]: in-place transform of a rendered audio [`Frame`]
//!
//! Renderers call filters in list order and never look inside them.

use crate::error::Result;
use crate::format::MediaFormat;
use crate::frame::Frame;
use crate::surface::Image;

/// Column-major 4x4 transform matrix.
pub type Matrix4 = [f32; 16];

/// Render target a surface renderer's filters draw into for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameCanvas {
    pub width: u32,
    pub height: u32,
    /// The decoded image bound as input texture for this frame.
    pub texture: Option<Image>,
    /// Composited output, handed to the encoder surface on swap.
    pub pixels: Vec<u8>,
}

impl FrameCanvas {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height, texture: None, pixels: Vec::new() }
    }

    /// Clear to black.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }
}

/// A drawing step in a surface renderer.
pub trait GlFilter: Send {
    /// # Errors
    ///
    /// Returns an error if the filter cannot allocate its resources.
    fn init(&mut self) -> Result<()>;

    /// Receives the renderer's view-projection matrix. Each filter gets its own copy.
    fn set_vp_matrix(&mut self, matrix: Matrix4);

    /// # Errors
    ///
    /// Returns an error if drawing fails.
    fn apply(&mut self, canvas: &mut FrameCanvas, presentation_time_ns: i64) -> Result<()>;

    fn release(&mut self);

    /// Whether this filter draws the decoded input frame. A chain without one gets a
    /// default frame filter inserted underneath.
    fn renders_frame(&self) -> bool {
        false
    }

    /// Whether this is the built-in frame filter rather than a caller-supplied one.
    fn is_default_frame_filter(&self) -> bool {
        false
    }
}

/// An in-place transform over rendered audio frames.
pub trait BufferFilter: Send {
    /// # Errors
    ///
    /// Returns an error if the target format is not supported by the filter.
    fn init(&mut self, format: &MediaFormat) -> Result<()>;

    fn apply(&mut self, frame: &mut Frame);

    fn release(&mut self);
}
