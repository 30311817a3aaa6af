// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0
//! Infrastructure layer: the provider REST client, node device discovery,
//! and the mount engine.

pub mod provider;
pub mod device;
pub mod mount;
