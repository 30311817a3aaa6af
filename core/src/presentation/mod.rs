// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0
//! gRPC surface that translates CSI RPCs into application-service calls.
//! No business logic lives here — all real work is delegated to
//! `crate::application`.

pub mod grpc;
