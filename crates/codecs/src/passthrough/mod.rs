// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Identity codecs.
//!
//! Used for raw-to-raw tracks and as the test double for real codec integrations.

mod arena;
mod decoder;
mod encoder;

pub use decoder::PassthroughDecoder;
pub use encoder::PassthroughEncoder;

/// Buffer slots per passthrough codec.
pub const DEFAULT_POOL_SIZE: usize = 2;
