// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! VM entity: the compute node a Volume can be attached to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::volume::VolumeId;

/// Stable numeric identifier for a VM, as minted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VmId(pub i64);

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VmId {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(VmId)
            .map_err(|_| VmError::InvalidId(s.to_string()))
    }
}

/// A compute instance in the provider's inventory, identified by a CSI
/// `NodeId` that this driver resolves to a VM via `Node::GetInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    pub id: VmId,
    pub name: String,
    pub datacenter_id: String,
    pub attached_volume_ids: Vec<VolumeId>,
}

impl Vm {
    pub fn has_volume(&self, volume: VolumeId) -> bool {
        self.attached_volume_ids.contains(&volume)
    }

    /// A VM accepts at most one attachment in flight per volume; this does
    /// not bound the total attachment count, which the provider enforces.
    pub fn attachment_count(&self) -> usize {
        self.attached_volume_ids.len()
    }
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("invalid vm id '{0}'")]
    InvalidId(String),

    #[error("vm {0} not found")]
    NotFound(VmId),

    #[error("node id '{0}' could not be resolved to a vm")]
    UnresolvedNodeId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_id_parses_decimal() {
        assert_eq!("7".parse::<VmId>().unwrap(), VmId(7));
    }

    #[test]
    fn vm_id_rejects_garbage() {
        assert!("node-abc".parse::<VmId>().is_err());
    }

    #[test]
    fn has_volume_reflects_attachment_list() {
        let vm = Vm {
            id: VmId(1),
            name: "vm-1".into(),
            datacenter_id: "dc-fra1".into(),
            attached_volume_ids: vec![VolumeId(10), VolumeId(11)],
        };
        assert!(vm.has_volume(VolumeId(10)));
        assert!(!vm.has_volume(VolumeId(99)));
        assert_eq!(vm.attachment_count(), 2);
    }
}
