// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! End-to-end `NodeEngine` tests against injected `DeviceDiscovery`/
//! `Mounter` doubles, exercising the idempotence guarantees of §4.3.2
//! without touching a real host.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use emma_csi_core::application::node_service::NodeEngine;
use emma_csi_core::domain::volume::FsType;
use emma_csi_core::infrastructure::device::{DeviceDiscovery, DiscoveryError};
use emma_csi_core::infrastructure::mount::{MountError, Mounter, VolumeStats};
use tokio_util::sync::CancellationToken;

struct CountingDiscovery {
    calls: AtomicUsize,
    device: PathBuf,
}

#[async_trait]
impl DeviceDiscovery for CountingDiscovery {
    async fn discover(&self, _cancel: &CancellationToken, _volume_id: &str) -> Result<PathBuf, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.device.clone())
    }
}

/// A `Mounter` double that tracks mounted paths in memory and counts how
/// many times it actually performed `mkfs` + `mount`.
struct FakeMounter {
    mounted: std::sync::Mutex<Vec<PathBuf>>,
    format_calls: AtomicUsize,
}

impl FakeMounter {
    fn new() -> Self {
        Self { mounted: std::sync::Mutex::new(Vec::new()), format_calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Mounter for FakeMounter {
    async fn is_mounted(&self, path: &Path) -> Result<bool, MountError> {
        Ok(self.mounted.lock().unwrap().iter().any(|p| p == path))
    }

    async fn format_and_mount(
        &self,
        _device: &Path,
        staging_path: &Path,
        _fs_type: FsType,
        _mount_options: &[String],
    ) -> Result<(), MountError> {
        self.format_calls.fetch_add(1, Ordering::SeqCst);
        self.mounted.lock().unwrap().push(staging_path.to_path_buf());
        Ok(())
    }

    async fn bind_mount(&self, _source: &Path, target: &Path, _read_only: bool) -> Result<(), MountError> {
        self.mounted.lock().unwrap().push(target.to_path_buf());
        Ok(())
    }

    async fn unmount(&self, path: &Path) -> Result<(), MountError> {
        self.mounted.lock().unwrap().retain(|p| p != path);
        Ok(())
    }

    async fn resize(&self, _device: &Path, _mount_point: &Path, _fs_type: FsType) -> Result<(), MountError> {
        Ok(())
    }

    fn stats(&self, _path: &Path) -> Result<VolumeStats, MountError> {
        Ok(VolumeStats {
            total_bytes: 0,
            used_bytes: 0,
            available_bytes: 0,
            total_inodes: 0,
            used_inodes: 0,
            available_inodes: 0,
        })
    }
}

#[tokio::test]
async fn staging_twice_for_the_same_path_formats_exactly_once() {
    let discovery =
        Arc::new(CountingDiscovery { calls: AtomicUsize::new(0), device: PathBuf::from("/dev/fake0") });
    let mounter = Arc::new(FakeMounter::new());
    let engine = NodeEngine::new(discovery, mounter.clone(), "node-1".to_string(), None);
    let cancel = CancellationToken::new();
    let staging = Path::new("/var/lib/kubelet/plugins/emma/staging/vol-1");

    engine.stage_volume(&cancel, "vol-1", staging, FsType::Ext4, &[]).await.unwrap();
    engine.stage_volume(&cancel, "vol-1", staging, FsType::Ext4, &[]).await.unwrap();

    assert_eq!(mounter.format_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unstage_on_missing_path_is_a_no_op() {
    let discovery =
        Arc::new(CountingDiscovery { calls: AtomicUsize::new(0), device: PathBuf::from("/dev/fake0") });
    let mounter = Arc::new(FakeMounter::new());
    let engine = NodeEngine::new(discovery, mounter, "node-1".to_string(), None);

    let result = engine.unstage_volume(Path::new("/no/such/staging/path")).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn publish_then_unpublish_round_trips_through_bind_mount() {
    let discovery =
        Arc::new(CountingDiscovery { calls: AtomicUsize::new(0), device: PathBuf::from("/dev/fake0") });
    let mounter = Arc::new(FakeMounter::new());
    let engine = NodeEngine::new(discovery, mounter.clone(), "node-1".to_string(), None);

    let staging = Path::new("/staging/vol-2");
    let target = Path::new("/var/lib/kubelet/pods/pod-1/volumes/vol-2");

    engine.publish_volume(staging, target, false).await.unwrap();
    assert!(mounter.mounted.lock().unwrap().iter().any(|p| p == target));

    engine.unpublish_volume(target).await.unwrap();
    assert!(!mounter.mounted.lock().unwrap().iter().any(|p| p == target));
}

#[tokio::test]
async fn get_info_advertises_datacenter_topology_when_configured() {
    let discovery =
        Arc::new(CountingDiscovery { calls: AtomicUsize::new(0), device: PathBuf::from("/dev/fake0") });
    let mounter = Arc::new(FakeMounter::new());
    let engine = NodeEngine::new(discovery, mounter, "node-1".to_string(), Some("fra1".to_string()));

    let info = engine.get_info();
    assert_eq!(info.node_id, "node-1");
    assert_eq!(
        info.datacenter_topology,
        Some(("topology.csi.emma.ms/datacenter".to_string(), "fra1".to_string()))
    );
}
