// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("unsupported filesystem type '{0}'")]
    UnsupportedFsType(String),

    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path {0} does not exist")]
    PathNotFound(String),
}
