// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Wire-shape request/response bodies for the provider REST API (§6).
//! These are deliberately distinct from the domain types in `domain::volume`
//! etc. — the domain model is the internal view; these structs are the
//! anti-corruption boundary against the provider's JSON shape.

use serde::{Deserialize, Serialize};

use crate::domain::cluster::{Cluster, ClusterNode, NodeGroup};
use crate::domain::vm::{Vm, VmId};
use crate::domain::volume::{PerformanceClass, Volume, VolumeId, VolumeStatus};

#[derive(Debug, Serialize)]
pub struct IssueTokenRequest {
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "expiresIn")]
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateVolumeRequest {
    pub name: String,
    #[serde(rename = "volumeGb")]
    pub volume_gb: u32,
    #[serde(rename = "volumeType")]
    pub volume_type: PerformanceClass,
    #[serde(rename = "dataCenterId")]
    pub data_center_id: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action")]
pub enum VolumeAction {
    #[serde(rename = "edit")]
    Edit {
        #[serde(rename = "sizeGb")]
        size_gb: u32,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "action")]
pub enum VmAction {
    #[serde(rename = "attach")]
    Attach {
        #[serde(rename = "volumeId")]
        volume_id: VolumeId,
    },
    #[serde(rename = "detach")]
    Detach {
        #[serde(rename = "volumeId")]
        volume_id: VolumeId,
    },
}

#[derive(Debug, Deserialize)]
pub struct VolumeDto {
    pub id: VolumeId,
    pub name: String,
    #[serde(rename = "volumeGb")]
    pub volume_gb: u32,
    #[serde(rename = "volumeType")]
    pub volume_type: PerformanceClass,
    #[serde(rename = "dataCenterId")]
    pub data_center_id: String,
    #[serde(rename = "attachedVmId")]
    pub attached_vm_id: Option<VmId>,
    pub status: VolumeStatus,
}

impl From<VolumeDto> for Volume {
    fn from(dto: VolumeDto) -> Self {
        Volume {
            id: dto.id,
            name: dto.name,
            size_gib: dto.volume_gb,
            performance_class: dto.volume_type,
            datacenter_id: dto.data_center_id,
            attached_vm_id: dto.attached_vm_id,
            status: dto.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VmDto {
    pub id: VmId,
    pub name: String,
    #[serde(rename = "dataCenterId")]
    pub data_center_id: String,
    #[serde(rename = "attachedVolumeIds", default)]
    pub attached_volume_ids: Vec<VolumeId>,
}

impl From<VmDto> for Vm {
    fn from(dto: VmDto) -> Self {
        Vm {
            id: dto.id,
            name: dto.name,
            datacenter_id: dto.data_center_id,
            attached_volume_ids: dto.attached_volume_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DataCenterDto {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ClusterNodeDto {
    pub name: String,
    #[serde(rename = "vmId")]
    pub vm_id: VmId,
}

#[derive(Debug, Deserialize)]
pub struct NodeGroupDto {
    pub name: String,
    pub nodes: Vec<ClusterNodeDto>,
}

#[derive(Debug, Deserialize)]
pub struct ClusterDto {
    pub name: String,
    #[serde(rename = "nodeGroups")]
    pub node_groups: Vec<NodeGroupDto>,
}

impl From<ClusterDto> for Cluster {
    fn from(dto: ClusterDto) -> Self {
        Cluster {
            name: dto.name,
            node_groups: dto
                .node_groups
                .into_iter()
                .map(|g| NodeGroup {
                    name: g.name,
                    nodes: g
                        .nodes
                        .into_iter()
                        .map(|n| ClusterNode { name: n.name, vm_id: n.vm_id })
                        .collect(),
                })
                .collect(),
        }
    }
}
