// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Video path: the surface renderer, its default filter and frame-rate reduction.

mod filters;
mod frame_dropper;
pub mod matrix;
mod renderer;

pub use filters::DefaultFrameRenderFilter;
pub use frame_dropper::FrameDropper;
pub use renderer::VideoRenderer;
