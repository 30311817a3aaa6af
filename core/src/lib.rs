// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0
//! # emma-csi-core
//!
//! Shared library for the `emma.ms` Container Storage Interface plugin. This
//! crate owns the domain model, the controller state-transition engine, the
//! provider HTTP client, the node device-discovery/mount engine, and the
//! gRPC presentation layer shared by the `emma-csi-controller` and
//! `emma-csi-node` binaries.
//!
//! ## Layer Structure
//!
//! ```text
//! presentation/   ← gRPC server (tonic): Identity, Controller, Node services
//!     ↓
//! application/    ← Controller state engine, node mount/stage orchestration
//!     ↓
//! domain/         ← Volume/VM/token aggregates, value objects, error taxonomy
//!     ↓
//! infrastructure/ ← Provider REST client, device discovery, mounter
//! ```
//!
//! ## Integration Tests
//!
//! See `core/tests/` for integration tests covering provider retry/backoff,
//! token refresh, size quantisation, and the controller lifecycle.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
