// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("timeout waiting for device for volume {0}")]
    Timeout(String),

    #[error("udev rescan failed: {0}")]
    UdevRescan(String),

    #[error("io error probing device candidates: {0}")]
    Io(#[from] std::io::Error),

    #[error("discovery was cancelled")]
    Cancelled,
}
