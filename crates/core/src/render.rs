// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Renderer contract shared by surface-based (video) and buffer-based (audio) renderers.

use crate::error::Result;
use crate::format::MediaFormat;
use crate::frame::Frame;
use crate::surface::{InputSurface, SurfaceTexture};

/// Which kind of payload a renderer moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Composites decoded images from a surface into an encoder surface.
    Surface,
    /// Copies decoded buffers into encoder input buffers.
    Buffer,
}

pub trait Renderer: Send {
    fn mode(&self) -> RenderMode;

    /// Prepare for rendering. Surface renderers require `output_surface` and `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if required inputs are missing or the formats are unsupported.
    fn init(
        &mut self,
        output_surface: Option<Box<dyn InputSurface>>,
        source: Option<&MediaFormat>,
        target: Option<&MediaFormat>,
    ) -> Result<()>;

    /// Rewire formats after a codec reported a format change, without recreating
    /// surfaces or filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the new formats are unsupported.
    fn on_media_format_changed(
        &mut self,
        source: Option<&MediaFormat>,
        target: Option<&MediaFormat>,
    ) -> Result<()>;

    /// The surface a surface-backed decoder should draw into.
    fn input_surface(&self) -> Option<SurfaceTexture>;

    /// Render one frame. Buffer renderers read `frame`; surface renderers ignore it and use the
    /// image most recently posted to their input surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the renderer is not initialised or a filter fails.
    fn render_frame(&mut self, frame: Option<&Frame>, presentation_time_ns: i64) -> Result<()>;

    /// Report a failure the renderer hit outside `render_frame`, e.g. on a thread it owns.
    /// Track transcoders call this on every tick, including after the decoder reached EOS.
    ///
    /// # Errors
    ///
    /// Returns the pending failure, once.
    fn check_health(&mut self) -> Result<()> {
        Ok(())
    }

    /// Idempotent.
    fn release(&mut self);

    /// Whether caller-supplied filters are installed.
    fn has_filters(&self) -> bool;
}
