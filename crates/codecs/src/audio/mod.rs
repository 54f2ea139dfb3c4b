// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Audio path: PCM processors, buffer renderers and buffer filters.
//!
//! All audio here is interleaved 16-bit little-endian PCM.

pub mod filters;
mod mixing;
mod passthrough_renderer;
mod processor;
mod renderer;
#[cfg(feature = "audio_resampler")]
mod resampler;

pub use mixing::{mix_channels, validate_channel_mix, ChannelMixingProcessor};
pub use passthrough_renderer::{PassthroughSoftwareRenderer, FRAME_WAIT_TIMEOUT};
pub use processor::{
    create_processor, AudioParams, AudioProcessor, PassthroughAudioProcessor, ResamplerConfig,
};
pub use renderer::AudioRenderer;
#[cfg(feature = "audio_resampler")]
pub use resampler::ResamplingProcessor;
