// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Identity: driver name/version/capability constants and the readiness
//! probe shared unmodified by both processes (§4.4).

use std::sync::Arc;

use tracing::warn;

use crate::infrastructure::provider::ProviderClient;

pub const DRIVER_NAME: &str = "csi.emma.ms";
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity's dependency check differs between the two processes: the
/// controller has a provider to ping, the node process is always ready.
pub enum ProbeTarget {
    Controller(Arc<ProviderClient>),
    Node,
}

pub struct IdentityEngine {
    probe_target: ProbeTarget,
}

impl IdentityEngine {
    pub fn new(probe_target: ProbeTarget) -> Self {
        Self { probe_target }
    }

    /// A failed probe is not fatal to the RPC — it simply reports
    /// not-ready (§4.4).
    pub async fn probe(&self) -> bool {
        match &self.probe_target {
            ProbeTarget::Node => true,
            ProbeTarget::Controller(provider) => match provider.get_data_centers().await {
                Ok(_) => true,
                Err(err) => {
                    warn!(error = %err, "probe dependency check failed");
                    false
                }
            },
        }
    }
}
