// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Wire/transport-facing error taxonomy for the Provider Client (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("transient provider error (retries exhausted): {0}")]
    Transient(String),

    #[error("deadline exceeded: {0}")]
    Deadline(String),

    #[error("volume entered FAILED state: {0}")]
    VolumeFailed(String),

    #[error("request was cancelled")]
    Cancelled,

    #[error("internal provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 | 422 => Self::InvalidArgument(body.to_string()),
            401 => Self::Unauthenticated(body.to_string()),
            403 => Self::PermissionDenied(body.to_string()),
            404 => Self::NotFound(body.to_string()),
            409 => Self::FailedPrecondition(body.to_string()),
            429 => Self::Transient(body.to_string()),
            s if (500..600).contains(&s) => Self::Transient(body.to_string()),
            _ => Self::Internal(format!("HTTP {status}: {body}")),
        }
    }

    /// Transient classes the retry loop in `client.rs` handles internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
