// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Device discovery: resolves a logical volume ID to a block device path
//! across heterogeneous cloud device-naming schemes (§4.3.1).

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::infrastructure::device::error::DiscoveryError;

pub const DISCOVERY_BUDGET: Duration = Duration::from_secs(90);
const SETTLE_WAIT: Duration = Duration::from_secs(2);
const UDEV_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
const UDEV_RETRIGGER_INTERVAL: Duration = Duration::from_secs(10);
const NEWEST_DEVICE_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const POLL_INITIAL_INTERVAL: Duration = Duration::from_millis(200);
const POLL_MAX_INTERVAL: Duration = Duration::from_secs(1);
const POLL_BACKOFF_FACTOR: f64 = 1.5;

const BY_ID_DIR: &str = "/dev/disk/by-id";

/// Capability abstraction over device discovery, so node-engine tests can
/// inject a host-free double (§9).
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    async fn discover(&self, cancel: &CancellationToken, volume_id: &str) -> Result<PathBuf, DiscoveryError>;
}

pub struct LinuxDeviceDiscovery {
    budget: Duration,
}

impl Default for LinuxDeviceDiscovery {
    fn default() -> Self {
        Self { budget: DISCOVERY_BUDGET }
    }
}

impl LinuxDeviceDiscovery {
    pub fn with_budget(budget: Duration) -> Self {
        Self { budget }
    }

    async fn udev_rescan(&self) {
        let trigger = Command::new("udevadm")
            .args(["trigger", "--subsystem-match=block"])
            .status()
            .await;
        if let Err(e) = trigger {
            warn!(error = %e, "udevadm trigger failed");
        }
        let settle = tokio::time::timeout(
            UDEV_SETTLE_TIMEOUT,
            Command::new("udevadm").args(["settle"]).status(),
        )
        .await;
        if settle.is_err() {
            warn!("udevadm settle did not complete within budget");
        }
    }

    /// First-pass "newest unused device" strategy (§4.3.1 step 3).
    fn newest_unused_device(&self, prefixes: &[&str]) -> Option<PathBuf> {
        let entries = std::fs::read_dir(BY_ID_DIR).ok()?;
        let mut best: Option<(SystemTime, PathBuf)> = None;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !prefixes.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            if name.contains("-part") {
                continue; // partition link
            }
            let link_path = entry.path();
            let Ok(resolved) = std::fs::canonicalize(&link_path) else { continue };
            if has_partitions(&resolved) || is_mounted(&resolved) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(mtime) = meta.modified() else { continue };

            match &best {
                Some((best_mtime, _)) if *best_mtime >= mtime => {}
                _ => best = Some((mtime, resolved)),
            }
        }

        best.map(|(_, path)| path)
    }

    /// Name-based candidate paths for a given volume ID (§4.3.1 step 4).
    fn name_based_candidates(volume_id: &str) -> Vec<PathBuf> {
        [
            format!("virtio-{volume_id}"),
            format!("google-{volume_id}"),
            format!("scsi-0Google_PersistentDisk_{volume_id}"),
            format!("scsi-{volume_id}"),
            format!("scsi-0QEMU_QEMU_HARDDISK_{volume_id}"),
            format!("ata-QEMU_HARDDISK_{volume_id}"),
        ]
        .into_iter()
        .map(|name| Path::new(BY_ID_DIR).join(name))
        .collect()
    }

    fn probe_name_candidates(volume_id: &str) -> Option<PathBuf> {
        for candidate in Self::name_based_candidates(volume_id) {
            if let Ok(resolved) = std::fs::canonicalize(&candidate) {
                return Some(resolved);
            }
        }
        None
    }

    /// Sysfs serial-number scan fallback (§4.3.1 step 4).
    fn sysfs_serial_scan(volume_id: &str) -> Option<PathBuf> {
        for prefix in ["vd", "sd"] {
            let glob_dir = "/sys/block";
            let Ok(entries) = std::fs::read_dir(glob_dir) else { continue };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !name.starts_with(prefix) {
                    continue;
                }
                let serial_path = entry.path().join("serial");
                if let Ok(serial) = std::fs::read_to_string(&serial_path) {
                    if serial.trim() == volume_id {
                        return Some(Path::new("/dev").join(name.to_string()));
                    }
                }
            }
        }
        None
    }
}

fn has_partitions(device: &Path) -> bool {
    let Some(dev_name) = device.file_name().and_then(|n| n.to_str()) else { return false };
    let sysfs_path = format!("/sys/class/block/{dev_name}");
    let Ok(entries) = std::fs::read_dir(&sysfs_path) else { return false };
    entries.flatten().any(|entry| {
        entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(dev_name) && name != dev_name)
            .unwrap_or(false)
    })
}

fn is_mounted(device: &Path) -> bool {
    let Ok(mounts) = std::fs::read_to_string("/proc/mounts") else { return false };
    let device_str = device.to_string_lossy();
    mounts.lines().any(|line| line.split_whitespace().next() == Some(device_str.as_ref()))
}

#[async_trait]
impl DeviceDiscovery for LinuxDeviceDiscovery {
    async fn discover(&self, cancel: &CancellationToken, volume_id: &str) -> Result<PathBuf, DiscoveryError> {
        let deadline = tokio::time::Instant::now() + self.budget;

        sleep(SETTLE_WAIT).await;
        self.udev_rescan().await;

        if let Some(path) = self.newest_unused_device(&["nvme-"]) {
            debug!(volume = volume_id, path = %path.display(), "resolved via nvme newest-device scan");
            return Ok(path);
        }
        if let Some(path) = self.newest_unused_device(&["google-", "scsi-0Google_PersistentDisk_", "scsi-"]) {
            debug!(volume = volume_id, path = %path.display(), "resolved via google/azure/scsi newest-device scan");
            return Ok(path);
        }

        let mut interval = POLL_INITIAL_INTERVAL;
        let mut since_last_udev = Duration::ZERO;
        let mut since_last_full_scan = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DiscoveryError::Timeout(volume_id.to_string()));
            }

            if let Some(path) = Self::probe_name_candidates(volume_id) {
                return Ok(path);
            }

            if since_last_full_scan >= NEWEST_DEVICE_RETRY_INTERVAL {
                since_last_full_scan = Duration::ZERO;
                if let Some(path) = self
                    .newest_unused_device(&["nvme-", "google-", "scsi-0Google_PersistentDisk_", "scsi-"])
                {
                    return Ok(path);
                }
                if let Some(path) = Self::sysfs_serial_scan(volume_id) {
                    return Ok(path);
                }
            }

            if since_last_udev >= UDEV_RETRIGGER_INTERVAL {
                since_last_udev = Duration::ZERO;
                self.udev_rescan().await;
            }

            tokio::select! {
                _ = sleep(interval) => {}
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            }
            since_last_udev += interval;
            since_last_full_scan += interval;
            interval = std::cmp::min(
                Duration::from_secs_f64(interval.as_secs_f64() * POLL_BACKOFF_FACTOR),
                POLL_MAX_INTERVAL,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_based_candidates_cover_every_naming_scheme() {
        let candidates = LinuxDeviceDiscovery::name_based_candidates("12345");
        let names: Vec<String> = candidates
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"virtio-12345".to_string()));
        assert!(names.contains(&"google-12345".to_string()));
        assert!(names.contains(&"scsi-0Google_PersistentDisk_12345".to_string()));
        assert!(names.contains(&"scsi-12345".to_string()));
        assert!(names.contains(&"scsi-0QEMU_QEMU_HARDDISK_12345".to_string()));
        assert!(names.contains(&"ata-QEMU_HARDDISK_12345".to_string()));
    }

    #[test]
    fn is_mounted_returns_false_for_nonexistent_device() {
        assert!(!is_mounted(Path::new("/dev/definitely-not-a-real-device")));
    }
}
