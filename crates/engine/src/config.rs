// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Configuration for the media transformer.

use crate::constants::DEFAULT_PROGRESS_GRANULARITY;
use crate::listener::CallbackContext;

/// Configuration shared by every job a [`crate::MediaTransformer`] runs.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// Report job progress in steps of `1 / progress_granularity` (default: 100).
    /// 0 reports every change, which can mean one callback per frame.
    pub progress_granularity: u32,
    /// Compare the estimated output size with the free space of each output volume before
    /// starting (default: true)
    pub check_disk_space: bool,
    /// Where listener callbacks run (default: inline on the job thread)
    pub callback_context: CallbackContext,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            progress_granularity: DEFAULT_PROGRESS_GRANULARITY,
            check_disk_space: true,
            callback_context: CallbackContext::Inline,
        }
    }
}
