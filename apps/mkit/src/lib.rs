// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

pub mod cli;
pub mod config;
pub mod logging;
pub mod transform;

// Re-export commonly used items for convenience
pub use config::MkitConfig;
pub use transform::{TransformRequest, run as run_transform};
