// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0
//! Mount engine: format/stage/publish/expand/stats helpers (§4.3.2).

pub mod error;
pub mod mounter;

pub use error::MountError;
pub use mounter::{ExecMounter, Mounter, VolumeStats};
