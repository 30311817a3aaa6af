// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0
//! Tonic-based CSI service implementations (Identity, Controller, Node)
//! plus the shared error → `tonic::Status` mapping and the UDS server
//! bootstrap.

pub mod csi {
    tonic::include_proto!("csi.v1");
}

pub mod status;
pub mod identity;
pub mod controller;
pub mod node;
pub mod server;
