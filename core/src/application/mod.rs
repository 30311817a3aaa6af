// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0
//! Application layer: the Controller state-transition engine and the
//! Node stage/publish orchestration, each driven by the gRPC presentation
//! layer and calling down into `infrastructure`.

pub mod controller_service;
pub mod node_service;
pub mod identity_service;
