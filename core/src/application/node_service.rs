// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Node stage/publish orchestration: resolves a logical volume to a block
//! device and drives the mount engine through the idempotent RPC table
//! in §4.3.2.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::volume::FsType;
use crate::infrastructure::device::{DeviceDiscovery, DiscoveryError};
use crate::infrastructure::mount::{MountError, Mounter, VolumeStats};

/// Provider-imposed limit on attachments per VM (§4.3.3).
pub const MAX_VOLUMES_PER_NODE: i64 = 16;

pub struct NodeInfo {
    pub node_id: String,
    pub max_volumes_per_node: i64,
    pub datacenter_topology: Option<(String, String)>,
}

pub struct NodeEngine {
    discovery: Arc<dyn DeviceDiscovery>,
    mounter: Arc<dyn Mounter>,
    node_id: String,
    datacenter_id: Option<String>,
    /// Serialises NodeStageVolume device discovery per-process; see the
    /// "newest device" race discussion in DESIGN.md.
    stage_lock: Mutex<()>,
}

impl NodeEngine {
    pub fn new(
        discovery: Arc<dyn DeviceDiscovery>,
        mounter: Arc<dyn Mounter>,
        node_id: String,
        datacenter_id: Option<String>,
    ) -> Self {
        Self { discovery, mounter, node_id, datacenter_id, stage_lock: Mutex::new(()) }
    }

    pub fn get_info(&self) -> NodeInfo {
        NodeInfo {
            node_id: self.node_id.clone(),
            max_volumes_per_node: MAX_VOLUMES_PER_NODE,
            datacenter_topology: self
                .datacenter_id
                .as_ref()
                .map(|dc| ("topology.csi.emma.ms/datacenter".to_string(), dc.clone())),
        }
    }

    pub async fn stage_volume(
        &self,
        cancel: &CancellationToken,
        volume_id: &str,
        staging_path: &Path,
        fs_type: FsType,
        mount_options: &[String],
    ) -> Result<(), NodeError> {
        if self.mounter.is_mounted(staging_path).await? {
            return Ok(());
        }

        let _guard = self.stage_lock.lock().await;

        // Re-check: another in-flight stage for a different volume may
        // have already mounted this exact staging path.
        if self.mounter.is_mounted(staging_path).await? {
            return Ok(());
        }

        let device = self.discovery.discover(cancel, volume_id).await?;
        info!(volume = volume_id, device = %device.display(), "device resolved, formatting and mounting");
        self.mounter.format_and_mount(&device, staging_path, fs_type, mount_options).await?;
        Ok(())
    }

    pub async fn unstage_volume(&self, staging_path: &Path) -> Result<(), NodeError> {
        if !staging_path.exists() {
            return Ok(());
        }
        self.mounter.unmount(staging_path).await?;
        Ok(())
    }

    pub async fn publish_volume(
        &self,
        staging_path: &Path,
        target_path: &Path,
        read_only: bool,
    ) -> Result<(), NodeError> {
        self.mounter.bind_mount(staging_path, target_path, read_only).await?;
        Ok(())
    }

    pub async fn unpublish_volume(&self, target_path: &Path) -> Result<(), NodeError> {
        if !target_path.exists() {
            return Ok(());
        }
        self.mounter.unmount(target_path).await?;
        Ok(())
    }

    pub async fn expand_volume(
        &self,
        cancel: &CancellationToken,
        volume_id: &str,
        mount_point: &Path,
        fs_type: FsType,
    ) -> Result<(), NodeError> {
        let device = self.discovery.discover(cancel, volume_id).await?;
        self.mounter.resize(&device, mount_point, fs_type).await?;
        Ok(())
    }

    pub fn volume_stats(&self, path: &Path) -> Result<VolumeStats, NodeError> {
        Ok(self.mounter.stats(path)?)
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DiscoveryError> for NodeError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Timeout(id) => Self::DeadlineExceeded(format!("timeout waiting for device {id}")),
            DiscoveryError::Cancelled => Self::Cancelled,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MountError> for NodeError {
    fn from(err: MountError) -> Self {
        match err {
            MountError::UnsupportedFsType(t) => Self::InvalidArgument(format!("unsupported fs type '{t}'")),
            MountError::PathNotFound(p) => Self::NotFound(p),
            other => Self::Internal(other.to_string()),
        }
    }
}
