// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Buffer filters for rendered audio frames.

mod volume;

pub use volume::{VolumeFilter, VolumeFilterConfig};
