// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Mount engine: idempotent format/stage/publish/expand/stats helpers
//! (§4.3.2). Shells out to `mkfs`, `mount`, `umount`, `blkid`, `resize2fs`,
//! and `xfs_growfs`; reads filesystem usage via `nix::sys::statvfs`.

use std::path::Path;

use async_trait::async_trait;
use nix::sys::statvfs::statvfs;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::volume::FsType;
use crate::infrastructure::mount::error::MountError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub total_inodes: u64,
    pub used_inodes: u64,
    pub available_inodes: u64,
}

/// Capability abstraction over mount operations, so the node engine's
/// tests can inject a host-free double (§9).
#[async_trait]
pub trait Mounter: Send + Sync {
    async fn is_mounted(&self, path: &Path) -> Result<bool, MountError>;
    async fn format_and_mount(
        &self,
        device: &Path,
        staging_path: &Path,
        fs_type: FsType,
        mount_options: &[String],
    ) -> Result<(), MountError>;
    async fn bind_mount(&self, source: &Path, target: &Path, read_only: bool) -> Result<(), MountError>;
    async fn unmount(&self, path: &Path) -> Result<(), MountError>;
    async fn resize(&self, device: &Path, mount_point: &Path, fs_type: FsType) -> Result<(), MountError>;
    fn stats(&self, path: &Path) -> Result<VolumeStats, MountError>;
}

pub struct ExecMounter;

impl ExecMounter {
    async fn run(command: &str, args: &[&str]) -> Result<std::process::Output, MountError> {
        debug!(command, ?args, "executing mount helper");
        Command::new(command)
            .args(args)
            .output()
            .await
            .map_err(|e| MountError::CommandFailed { command: command.to_string(), message: e.to_string() })
    }

    async fn run_checked(command: &str, args: &[&str]) -> Result<(), MountError> {
        let output = Self::run(command, args).await?;
        if !output.status.success() {
            return Err(MountError::CommandFailed {
                command: command.to_string(),
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    /// Returns the filesystem type `blkid` reports, or `None` if the
    /// device has no recognisable filesystem.
    async fn existing_fs_type(device: &Path) -> Result<Option<String>, MountError> {
        let output = Self::run("blkid", &["-o", "value", "-s", "TYPE", &device.to_string_lossy()]).await?;
        if !output.status.success() {
            // blkid exits non-zero when the device has no recognised fs.
            return Ok(None);
        }
        let fs = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if fs.is_empty() { None } else { Some(fs) })
    }
}

#[async_trait]
impl Mounter for ExecMounter {
    async fn is_mounted(&self, path: &Path) -> Result<bool, MountError> {
        let output = Self::run("findmnt", &["--noheadings", &path.to_string_lossy()]).await?;
        Ok(output.status.success())
    }

    async fn format_and_mount(
        &self,
        device: &Path,
        staging_path: &Path,
        fs_type: FsType,
        mount_options: &[String],
    ) -> Result<(), MountError> {
        if self.is_mounted(staging_path).await? {
            debug!(staging = %staging_path.display(), "already mounted, staging is idempotent no-op");
            return Ok(());
        }

        let wanted = fs_type.to_string();
        match Self::existing_fs_type(device).await? {
            Some(existing) if existing == wanted => {
                debug!(device = %device.display(), fs_type = %existing, "device already formatted");
            }
            Some(existing) => {
                warn!(device = %device.display(), existing, wanted, "filesystem mismatch, leaving device as-is");
            }
            None => {
                let dev = device.to_string_lossy();
                let (cmd, args): (&str, Vec<&str>) = match fs_type {
                    FsType::Ext4 => ("mkfs.ext4", vec!["-F", &dev]),
                    FsType::Xfs => ("mkfs.xfs", vec!["-f", &dev]),
                };
                Self::run_checked(cmd, &args).await?;
            }
        }

        tokio::fs::create_dir_all(staging_path).await?;

        let mut args = vec!["-t".to_string(), wanted];
        if !mount_options.is_empty() {
            args.push("-o".to_string());
            args.push(mount_options.join(","));
        }
        args.push(device.to_string_lossy().to_string());
        args.push(staging_path.to_string_lossy().to_string());

        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        Self::run_checked("mount", &args_ref).await
    }

    async fn bind_mount(&self, source: &Path, target: &Path, read_only: bool) -> Result<(), MountError> {
        if self.is_mounted(target).await? {
            debug!(target = %target.display(), "already bind-mounted, publish is idempotent no-op");
            return Ok(());
        }

        tokio::fs::create_dir_all(target).await?;

        Self::run_checked(
            "mount",
            &["--bind", &source.to_string_lossy(), &target.to_string_lossy()],
        )
        .await?;

        if read_only {
            Self::run_checked(
                "mount",
                &["-o", "remount,ro,bind", &target.to_string_lossy()],
            )
            .await?;
        }

        Ok(())
    }

    async fn unmount(&self, path: &Path) -> Result<(), MountError> {
        if !path.exists() || !self.is_mounted(path).await? {
            debug!(path = %path.display(), "not mounted, unpublish/unstage is idempotent no-op");
            return Ok(());
        }
        Self::run_checked("umount", &[&path.to_string_lossy()]).await?;
        let _ = tokio::fs::remove_dir(path).await;
        Ok(())
    }

    async fn resize(&self, device: &Path, mount_point: &Path, fs_type: FsType) -> Result<(), MountError> {
        match fs_type {
            FsType::Ext4 => Self::run_checked("resize2fs", &[&device.to_string_lossy()]).await,
            FsType::Xfs => Self::run_checked("xfs_growfs", &[&mount_point.to_string_lossy()]).await,
        }
    }

    fn stats(&self, path: &Path) -> Result<VolumeStats, MountError> {
        if !path.exists() {
            return Err(MountError::PathNotFound(path.to_string_lossy().to_string()));
        }
        let stat = statvfs(path).map_err(|e| MountError::CommandFailed {
            command: "statvfs".to_string(),
            message: e.to_string(),
        })?;

        let block_size = stat.fragment_size();
        let total_bytes = stat.blocks() * block_size;
        let available_bytes = stat.blocks_available() * block_size;
        let used_bytes = total_bytes.saturating_sub(stat.blocks_free() * block_size);

        Ok(VolumeStats {
            total_bytes,
            used_bytes,
            available_bytes,
            total_inodes: stat.files(),
            used_inodes: stat.files().saturating_sub(stat.files_free()),
            available_inodes: stat.files_available(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stats_rejects_missing_path() {
        let mounter = ExecMounter;
        let err = mounter.stats(Path::new("/no/such/path/exists")).unwrap_err();
        assert!(matches!(err, MountError::PathNotFound(_)));
    }
}
