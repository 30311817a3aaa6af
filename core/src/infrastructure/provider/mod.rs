// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0
//! Provider REST client: authentication, retries, and status polling (§4.1).

pub mod client;
pub mod error;
pub mod models;
pub mod token;

pub use client::ProviderClient;
pub use error::ProviderError;
