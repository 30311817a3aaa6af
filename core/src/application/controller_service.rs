// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Controller state-transition engine: turns idempotent CSI RPCs into a
//! sequence of provider REST calls over the DRAFT → AVAILABLE → ACTIVE →
//! AVAILABLE → DELETED lifecycle machine (§4.2).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::cluster::resolve_node_to_vm;
use crate::domain::vm::VmId;
use crate::domain::volume::{
    quantise_size_gib, requested_gib_from_bytes, FsType, PerformanceClass, Volume, VolumeId, VolumeStatus,
};
use crate::infrastructure::provider::{ProviderClient, ProviderError};

const CREATE_BUDGET: Duration = Duration::from_secs(5 * 60);
const ATTACH_BUDGET: Duration = Duration::from_secs(5 * 60);
const DETACH_BUDGET: Duration = Duration::from_secs(5 * 60);
const RESIZE_BUDGET: Duration = Duration::from_secs(5 * 60);

/// Volume capability requirements validated by every controller RPC
/// that accepts one (§4.2.1 step 1, §8.8).
pub struct CapabilityRequest {
    pub single_node_writer: bool,
    pub fs_type: Option<String>,
    pub is_block: bool,
}

pub struct CreateVolumeParams {
    pub name: String,
    pub required_bytes: i64,
    pub limit_bytes: i64,
    pub performance_class: PerformanceClass,
    pub datacenter_id: String,
    pub fs_type: FsType,
}

pub struct CreatedVolume {
    pub volume: Volume,
    pub size_gib: u32,
}

pub struct ExpandedVolume {
    pub size_gib: u32,
    pub node_expansion_required: bool,
}

pub struct ControllerEngine {
    provider: Arc<ProviderClient>,
}

impl ControllerEngine {
    pub fn new(provider: Arc<ProviderClient>) -> Self {
        Self { provider }
    }

    pub fn validate_capability(cap: &CapabilityRequest) -> Result<(), ControllerError> {
        if !cap.single_node_writer {
            return Err(ControllerError::InvalidArgument(
                "only SINGLE_NODE_WRITER access mode is supported".to_string(),
            ));
        }
        if !cap.is_block {
            match cap.fs_type.as_deref() {
                Some("ext4") | Some("xfs") | None => {}
                Some(other) => {
                    return Err(ControllerError::InvalidArgument(format!(
                        "unsupported fs type '{other}'"
                    )))
                }
            }
        }
        Ok(())
    }

    /// §4.2.1
    pub async fn create_volume(
        &self,
        cancel: &CancellationToken,
        params: CreateVolumeParams,
    ) -> Result<CreatedVolume, ControllerError> {
        let requested_gib = requested_gib_from_bytes(params.required_bytes, params.limit_bytes)
            .map_err(|e| ControllerError::InvalidArgument(e.to_string()))?;
        let size_gib = quantise_size_gib(requested_gib);

        self.provider
            .validate_data_center(&params.datacenter_id)
            .await
            .map_err(ControllerError::from_provider)?;

        let volume = self
            .provider
            .create_volume(&params.name, size_gib, params.performance_class, &params.datacenter_id)
            .await
            .map_err(ControllerError::from_provider)?;

        match self
            .provider
            .wait_for_volume_status(cancel, volume.id, VolumeStatus::Available, CREATE_BUDGET)
            .await
        {
            Ok(volume) => Ok(CreatedVolume { volume, size_gib }),
            Err(err) => {
                warn!(volume = %volume.id, error = %err, "create wait failed, best-effort cleanup");
                let _ = self.provider.delete_volume(volume.id).await;
                Err(ControllerError::Internal(format!(
                    "volume {} failed to become available: {err}",
                    volume.id
                )))
            }
        }
    }

    /// §4.2.2
    pub async fn delete_volume(&self, cancel: &CancellationToken, handle: &str) -> Result<(), ControllerError> {
        let id = VolumeId::from_str(handle).map_err(|e| ControllerError::InvalidArgument(e.to_string()))?;

        let volume = match self.provider.get_volume(id).await.map_err(ControllerError::from_provider)? {
            Some(v) => v,
            None => return Ok(()),
        };

        if let Some(vm_id) = volume.attached_vm_id {
            self.provider
                .detach_volume(cancel, vm_id, id)
                .await
                .map_err(ControllerError::from_provider)?;
            self.provider
                .wait_for_volume_detachment(cancel, id, DETACH_BUDGET)
                .await
                .map_err(ControllerError::from_provider)?;
        }

        match self.provider.delete_volume(id).await {
            Ok(()) => Ok(()),
            Err(ProviderError::FailedPrecondition(msg)) => {
                Err(ControllerError::Internal(format!("delete conflict for volume {id}: {msg}")))
            }
            Err(e) => Err(ControllerError::from_provider(e)),
        }
    }

    /// §4.2.3
    pub async fn publish_volume(
        &self,
        cancel: &CancellationToken,
        handle: &str,
        node_id: &str,
        cap: &CapabilityRequest,
        clusters: impl FnOnce() -> Option<Vec<crate::domain::cluster::Cluster>>,
    ) -> Result<VmId, ControllerError> {
        Self::validate_capability(cap)?;
        let id = VolumeId::from_str(handle).map_err(|e| ControllerError::InvalidArgument(e.to_string()))?;
        let vm_id = self.resolve_vm(node_id, clusters).await?;

        let volume = self
            .provider
            .get_volume(id)
            .await
            .map_err(ControllerError::from_provider)?
            .ok_or_else(|| ControllerError::NotFound(format!("volume {id} not found")))?;

        if let Some(attached) = volume.attached_vm_id {
            if attached == vm_id {
                info!(volume = %id, vm = %vm_id, "volume already attached to requested vm");
                return Ok(vm_id);
            }
            return Err(ControllerError::FailedPrecondition(format!(
                "volume {id} is attached to vm {attached}, not {vm_id}"
            )));
        }

        self.provider
            .attach_volume(cancel, vm_id, id)
            .await
            .map_err(ControllerError::from_provider)?;
        self.provider
            .wait_for_volume_attachment(cancel, id, vm_id, ATTACH_BUDGET)
            .await
            .map_err(ControllerError::from_provider)?;

        Ok(vm_id)
    }

    /// §4.2.4
    pub async fn unpublish_volume(
        &self,
        cancel: &CancellationToken,
        handle: &str,
        node_id: &str,
        clusters: impl FnOnce() -> Option<Vec<crate::domain::cluster::Cluster>>,
    ) -> Result<(), ControllerError> {
        let id = VolumeId::from_str(handle).map_err(|e| ControllerError::InvalidArgument(e.to_string()))?;
        let vm_id = self.resolve_vm(node_id, clusters).await?;

        let volume = match self.provider.get_volume(id).await.map_err(ControllerError::from_provider)? {
            Some(v) => v,
            None => return Ok(()),
        };

        match volume.attached_vm_id {
            None => Ok(()),
            Some(attached) if attached != vm_id => Ok(()),
            Some(_) => {
                self.provider
                    .detach_volume(cancel, vm_id, id)
                    .await
                    .map_err(ControllerError::from_provider)?;
                self.provider
                    .wait_for_volume_detachment(cancel, id, DETACH_BUDGET)
                    .await
                    .map_err(ControllerError::from_provider)?;
                Ok(())
            }
        }
    }

    /// §4.2.5
    pub async fn expand_volume(
        &self,
        cancel: &CancellationToken,
        handle: &str,
        required_bytes: i64,
    ) -> Result<ExpandedVolume, ControllerError> {
        let id = VolumeId::from_str(handle).map_err(|e| ControllerError::InvalidArgument(e.to_string()))?;
        let current = self
            .provider
            .get_volume(id)
            .await
            .map_err(ControllerError::from_provider)?
            .ok_or_else(|| ControllerError::NotFound(format!("volume {id} not found")))?;

        let requested_gib = requested_gib_from_bytes(required_bytes, 0)
            .map_err(|e| ControllerError::InvalidArgument(e.to_string()))?;
        let new_size = quantise_size_gib(requested_gib);

        if new_size <= current.size_gib {
            return Err(ControllerError::InvalidArgument(format!(
                "requested size {new_size}GiB is not greater than current size {}GiB",
                current.size_gib
            )));
        }

        self.provider
            .resize_volume(id, new_size)
            .await
            .map_err(ControllerError::from_provider)?;

        let target_status = if current.status.implies_attachment() {
            VolumeStatus::Active
        } else {
            VolumeStatus::Available
        };

        self.provider
            .wait_for_volume_status(cancel, id, target_status, RESIZE_BUDGET)
            .await
            .map_err(ControllerError::from_provider)?;

        Ok(ExpandedVolume { size_gib: new_size, node_expansion_required: true })
    }

    /// §4.1 `ListVolumes`: the provider exposes no native pagination, so
    /// the engine sorts by id for a stable order and windows the result
    /// by `starting_token` (a stringified offset) and `max_entries`.
    pub async fn list_volumes(
        &self,
        starting_token: &str,
        max_entries: usize,
    ) -> Result<(Vec<Volume>, Option<String>), ControllerError> {
        let offset: usize = if starting_token.is_empty() {
            0
        } else {
            starting_token
                .parse()
                .map_err(|_| ControllerError::InvalidArgument(format!("invalid starting_token '{starting_token}'")))?
        };

        let mut volumes = self.provider.list_volumes().await.map_err(ControllerError::from_provider)?;
        volumes.sort_by_key(|v| v.id);

        if offset > volumes.len() {
            return Err(ControllerError::InvalidArgument(format!(
                "starting_token {offset} is past the end of the volume list"
            )));
        }

        let remaining = &volumes[offset..];
        if max_entries == 0 || remaining.len() <= max_entries {
            return Ok((remaining.to_vec(), None));
        }

        let page = remaining[..max_entries].to_vec();
        Ok((page, Some((offset + max_entries).to_string())))
    }

    async fn resolve_vm(
        &self,
        node_id: &str,
        clusters: impl FnOnce() -> Option<Vec<crate::domain::cluster::Cluster>>,
    ) -> Result<VmId, ControllerError> {
        if let Ok(id) = VmId::from_str(node_id) {
            return Ok(id);
        }

        let clusters = match clusters() {
            Some(c) => c,
            None => self.provider.list_kubernetes_clusters().await.map_err(ControllerError::from_provider)?,
        };

        resolve_node_to_vm(&clusters, node_id)
            .ok_or_else(|| ControllerError::InvalidArgument(format!("node '{node_id}' not found in any cluster")))
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl ControllerError {
    fn from_provider(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidArgument(m) => Self::InvalidArgument(m),
            ProviderError::Unauthenticated(m) => Self::Unauthenticated(m),
            ProviderError::PermissionDenied(m) => Self::PermissionDenied(m),
            ProviderError::NotFound(m) => Self::NotFound(m),
            ProviderError::FailedPrecondition(m) => Self::FailedPrecondition(m),
            ProviderError::Transient(m) => Self::Internal(m),
            ProviderError::Deadline(m) => Self::DeadlineExceeded(m),
            ProviderError::VolumeFailed(m) => Self::Internal(format!("volume entered FAILED state: {m}")),
            ProviderError::Cancelled => Self::Cancelled,
            ProviderError::Internal(m) => Self::Internal(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_single_node_writer() {
        let cap = CapabilityRequest { single_node_writer: false, fs_type: Some("ext4".into()), is_block: false };
        assert!(matches!(
            ControllerEngine::validate_capability(&cap),
            Err(ControllerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_unsupported_fs_type() {
        let cap = CapabilityRequest { single_node_writer: true, fs_type: Some("btrfs".into()), is_block: false };
        assert!(matches!(
            ControllerEngine::validate_capability(&cap),
            Err(ControllerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn accepts_block_capability_regardless_of_fs_type() {
        let cap = CapabilityRequest { single_node_writer: true, fs_type: None, is_block: true };
        assert!(ControllerEngine::validate_capability(&cap).is_ok());
    }
}
