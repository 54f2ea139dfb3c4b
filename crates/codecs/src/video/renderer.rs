// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Surface-based video renderer.
//!
//! The decoder draws into the renderer's [`SurfaceTexture`]; each `render_frame` binds the
//! latest image, runs the filter chain over a [`FrameCanvas`] and swaps the result into the
//! encoder's [`InputSurface`].

use super::filters::DefaultFrameRenderFilter;
use super::matrix;
use mediakit_core::surface::DEFAULT_IMAGE_WAIT_TIMEOUT;
use mediakit_core::{
    Frame, FrameCanvas, GlFilter, InputSurface, Matrix4, MediaFormat, MediaKitError, RenderMode,
    Renderer, Result, SurfaceTexture,
};
use std::time::Duration;

pub struct VideoRenderer {
    filters: Vec<Box<dyn GlFilter>>,
    has_user_filters: bool,
    input_texture: SurfaceTexture,
    output_surface: Option<Box<dyn InputSurface>>,
    canvas: FrameCanvas,
    vp_matrix: Matrix4,
    frame_wait_timeout: Duration,
    source_format: Option<MediaFormat>,
    target_format: Option<MediaFormat>,
    released: bool,
}

impl VideoRenderer {
    /// Build a renderer over `filters`, applied in order. A default frame filter is inserted
    /// first when none of them draws the decoded frame.
    pub fn new(mut filters: Vec<Box<dyn GlFilter>>) -> Self {
        let has_user_filters = filters.iter().any(|filter| !filter.is_default_frame_filter());
        if !filters.iter().any(|filter| filter.renders_frame()) {
            filters.insert(0, Box::new(DefaultFrameRenderFilter::new()));
        }
        Self {
            filters,
            has_user_filters,
            input_texture: SurfaceTexture::new(),
            output_surface: None,
            canvas: FrameCanvas::default(),
            vp_matrix: matrix::IDENTITY,
            frame_wait_timeout: DEFAULT_IMAGE_WAIT_TIMEOUT,
            source_format: None,
            target_format: None,
            released: false,
        }
    }

    #[must_use]
    pub const fn with_frame_wait_timeout(mut self, timeout: Duration) -> Self {
        self.frame_wait_timeout = timeout;
        self
    }

    pub const fn vp_matrix(&self) -> &Matrix4 {
        &self.vp_matrix
    }

    pub const fn source_format(&self) -> Option<&MediaFormat> {
        self.source_format.as_ref()
    }

    pub const fn target_format(&self) -> Option<&MediaFormat> {
        self.target_format.as_ref()
    }
}

#[allow(clippy::cast_precision_loss)]
fn aspect_ratio(format: &MediaFormat) -> f32 {
    match (format.width(), format.height()) {
        (Some(width), Some(height)) if width > 0 && height > 0 => width as f32 / height as f32,
        _ => 1.0,
    }
}

impl Renderer for VideoRenderer {
    fn mode(&self) -> RenderMode {
        RenderMode::Surface
    }

    fn init(
        &mut self,
        output_surface: Option<Box<dyn InputSurface>>,
        source: Option<&MediaFormat>,
        target: Option<&MediaFormat>,
    ) -> Result<()> {
        if self.released {
            return Err(MediaKitError::Render("video renderer was released".to_string()));
        }
        let Some(output_surface) = output_surface else {
            return Err(MediaKitError::Render("video renderer needs an output surface".to_string()));
        };
        let Some(target) = target else {
            return Err(MediaKitError::Configuration(
                "video renderer needs a target format".to_string(),
            ));
        };

        let rotation = target.rotation().or_else(|| source.and_then(MediaFormat::rotation)).unwrap_or(0);
        self.vp_matrix = matrix::vp_matrix(rotation, aspect_ratio(target));
        self.canvas = FrameCanvas::new(target.width().unwrap_or(0), target.height().unwrap_or(0));
        self.output_surface = Some(output_surface);
        self.source_format = source.cloned();
        self.target_format = Some(target.clone());

        for filter in &mut self.filters {
            filter.init()?;
            filter.set_vp_matrix(self.vp_matrix);
        }
        tracing::debug!(rotation, filters = self.filters.len(), "Video renderer initialised");
        Ok(())
    }

    fn on_media_format_changed(
        &mut self,
        source: Option<&MediaFormat>,
        target: Option<&MediaFormat>,
    ) -> Result<()> {
        self.source_format = source.cloned();
        self.target_format = target.cloned();
        Ok(())
    }

    fn input_surface(&self) -> Option<SurfaceTexture> {
        Some(self.input_texture.clone())
    }

    fn render_frame(&mut self, _frame: Option<&Frame>, presentation_time_ns: i64) -> Result<()> {
        if self.released {
            return Err(MediaKitError::Render("video renderer was released".to_string()));
        }
        let Some(surface) = self.output_surface.as_mut() else {
            return Err(MediaKitError::Render("video renderer not initialised".to_string()));
        };

        let image = self.input_texture.await_new_image(self.frame_wait_timeout)?;
        self.canvas.texture = Some(image);
        self.canvas.clear();
        for filter in &mut self.filters {
            filter.apply(&mut self.canvas, presentation_time_ns)?;
        }

        surface.set_presentation_time(presentation_time_ns);
        surface.swap_buffers(&self.canvas.pixels)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for filter in &mut self.filters {
            filter.release();
        }
        self.input_texture.release();
        if let Some(mut surface) = self.output_surface.take() {
            surface.release();
        }
        self.canvas = FrameCanvas::default();
    }

    fn has_filters(&self) -> bool {
        self.has_user_filters
    }
}
