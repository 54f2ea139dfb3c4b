// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use mediakit_core::{FrameCanvas, GlFilter, Matrix4, Result};

/// Draws the decoded input frame onto the canvas unchanged.
///
/// Inserted at the bottom of a chain that has no frame-rendering filter of its own.
#[derive(Debug, Default)]
pub struct DefaultFrameRenderFilter {
    vp_matrix: Option<Matrix4>,
}

impl DefaultFrameRenderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn vp_matrix(&self) -> Option<&Matrix4> {
        self.vp_matrix.as_ref()
    }
}

impl GlFilter for DefaultFrameRenderFilter {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_vp_matrix(&mut self, matrix: Matrix4) {
        self.vp_matrix = Some(matrix);
    }

    fn apply(&mut self, canvas: &mut FrameCanvas, _presentation_time_ns: i64) -> Result<()> {
        if let Some(texture) = &canvas.texture {
            canvas.pixels.clear();
            canvas.pixels.extend_from_slice(&texture.data);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.vp_matrix = None;
    }

    fn renders_frame(&self) -> bool {
        true
    }

    fn is_default_frame_filter(&self) -> bool {
        true
    }
}
