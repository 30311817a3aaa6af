// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Cluster membership: the hierarchical cluster → node-group → node record
//! the controller searches to resolve an orchestrator node name to a
//! provider VM ID.

use serde::{Deserialize, Serialize};

use crate::domain::vm::VmId;

/// A single orchestrator-visible node and its provider-side VM identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub name: String,
    pub vm_id: VmId,
}

/// A named group of nodes within a cluster (e.g. a node pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub name: String,
    pub nodes: Vec<ClusterNode>,
}

/// A Kubernetes-style cluster record as returned by `ListKubernetesClusters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub node_groups: Vec<NodeGroup>,
}

/// Linearly search `clusters` for a node named `node_name`, returning its
/// VM ID. Mirrors §4.2.3 step 2: this is only reached once the caller has
/// established the identifier is not already a bare integer VM ID.
pub fn resolve_node_to_vm(clusters: &[Cluster], node_name: &str) -> Option<VmId> {
    clusters
        .iter()
        .flat_map(|cluster| cluster.node_groups.iter())
        .flat_map(|group| group.nodes.iter())
        .find(|node| node.name == node_name)
        .map(|node| node.vm_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<Cluster> {
        vec![Cluster {
            name: "prod".into(),
            node_groups: vec![
                NodeGroup {
                    name: "pool-a".into(),
                    nodes: vec![
                        ClusterNode { name: "worker-1".into(), vm_id: VmId(101) },
                        ClusterNode { name: "worker-2".into(), vm_id: VmId(102) },
                    ],
                },
                NodeGroup {
                    name: "pool-b".into(),
                    nodes: vec![ClusterNode { name: "worker-3".into(), vm_id: VmId(103) }],
                },
            ],
        }]
    }

    #[test]
    fn resolves_node_in_second_group() {
        let clusters = fixture();
        assert_eq!(resolve_node_to_vm(&clusters, "worker-3"), Some(VmId(103)));
    }

    #[test]
    fn returns_none_for_unknown_node() {
        let clusters = fixture();
        assert_eq!(resolve_node_to_vm(&clusters, "worker-99"), None);
    }
}
