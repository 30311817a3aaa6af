// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Volume aggregate: the provider's primary block-storage entity.
//!
//! Mirrors the lifecycle machine DRAFT → AVAILABLE → ACTIVE → AVAILABLE → DELETED
//! reported by the provider API. This module models the aggregate and its
//! invariants only; the state *transitions* driven by CSI RPCs live in
//! `application::controller_service`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::vm::VmId;

/// Smallest volume size the provider accepts, in GiB.
pub const MIN_SIZE_GIB: u32 = 1;
/// Largest volume size the provider accepts, in GiB.
pub const MAX_SIZE_GIB: u32 = 2048;
/// Bytes per GiB.
pub const BYTES_PER_GIB: u64 = 1 << 30;

/// Stable numeric identifier for a Volume, as minted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeId(pub i64);

impl VolumeId {
    /// The CSI volume handle is the decimal stringified volume id.
    pub fn as_handle(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VolumeId {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(VolumeId)
            .map_err(|_| VolumeError::InvalidHandle(s.to_string()))
    }
}

/// Performance class requested via the `type` StorageClass parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceClass {
    Ssd,
    SsdPlus,
    Hdd,
}

impl Default for PerformanceClass {
    fn default() -> Self {
        Self::Ssd
    }
}

impl FromStr for PerformanceClass {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssd" => Ok(Self::Ssd),
            "ssd-plus" => Ok(Self::SsdPlus),
            "hdd" => Ok(Self::Hdd),
            other => Err(VolumeError::InvalidParameter(format!(
                "unknown volume type '{other}', expected one of ssd, ssd-plus, hdd"
            ))),
        }
    }
}

impl fmt::Display for PerformanceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ssd => "ssd",
            Self::SsdPlus => "ssd-plus",
            Self::Hdd => "hdd",
        };
        write!(f, "{s}")
    }
}

/// Mountable filesystem types this driver formats and grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Ext4,
    Xfs,
}

impl Default for FsType {
    fn default() -> Self {
        Self::Ext4
    }
}

impl FromStr for FsType {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ext4" => Ok(Self::Ext4),
            "xfs" => Ok(Self::Xfs),
            other => Err(VolumeError::UnsupportedFsType(other.to_string())),
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle status reported by the provider for a Volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolumeStatus {
    Draft,
    Busy,
    Available,
    Active,
    Failed,
    Deleted,
}

impl VolumeStatus {
    /// Per the data model: `attached-VM != null` iff status is ACTIVE, or
    /// transiently BUSY while an attach/detach is in flight.
    pub fn implies_attachment(&self) -> bool {
        matches!(self, Self::Active | Self::Busy)
    }
}

/// The provider's primary block-storage entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub name: String,
    pub size_gib: u32,
    pub performance_class: PerformanceClass,
    pub datacenter_id: String,
    pub attached_vm_id: Option<VmId>,
    pub status: VolumeStatus,
}

impl Volume {
    pub fn is_attached_to(&self, vm: VmId) -> bool {
        self.attached_vm_id == Some(vm)
    }

    pub fn is_attached(&self) -> bool {
        self.attached_vm_id.is_some()
    }
}

/// Round `required`/`limit` bytes up to whole GiB, `required` taking
/// precedence when both are supplied.
pub fn requested_gib_from_bytes(required_bytes: i64, limit_bytes: i64) -> Result<u64, VolumeError> {
    let required = required_bytes.max(0) as u64;
    let limit = limit_bytes.max(0) as u64;

    let bytes = if required > 0 { required } else { limit };
    if bytes == 0 {
        return Err(VolumeError::InvalidParameter(
            "either required_bytes or limit_bytes must be greater than zero".to_string(),
        ));
    }

    Ok((bytes + BYTES_PER_GIB - 1) / BYTES_PER_GIB)
}

/// Quantise a requested GiB count to the smallest power of two in
/// `[MIN_SIZE_GIB, MAX_SIZE_GIB]` the provider accepts.
pub fn quantise_size_gib(requested_gib: u64) -> u32 {
    if requested_gib <= MIN_SIZE_GIB as u64 {
        return MIN_SIZE_GIB;
    }
    if requested_gib >= MAX_SIZE_GIB as u64 {
        return MAX_SIZE_GIB;
    }

    let mut size = MIN_SIZE_GIB;
    while (size as u64) < requested_gib {
        size *= 2;
    }
    size
}

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("invalid volume handle '{0}'")]
    InvalidHandle(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unsupported filesystem type '{0}', expected ext4 or xfs")]
    UnsupportedFsType(String),

    #[error("volume {0} not found")]
    NotFound(VolumeId),

    #[error("volume {id} is attached to a different vm ({other})")]
    AttachedElsewhere { id: VolumeId, other: VmId },

    #[error("volume {0} entered FAILED state")]
    Failed(VolumeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantises_below_minimum_up_to_one() {
        assert_eq!(quantise_size_gib(0), 1);
    }

    #[test]
    fn quantises_one_to_one() {
        assert_eq!(quantise_size_gib(1), 1);
    }

    #[test]
    fn quantises_fifteen_to_sixteen() {
        assert_eq!(quantise_size_gib(15), 16);
    }

    #[test]
    fn quantises_power_of_two_to_itself() {
        assert_eq!(quantise_size_gib(64), 64);
    }

    #[test]
    fn clamps_above_maximum() {
        assert_eq!(quantise_size_gib(5000), MAX_SIZE_GIB);
    }

    #[test]
    fn exhaustive_power_of_two_property() {
        for r in 1u64..=2048 {
            let q = quantise_size_gib(r);
            assert!(q.is_power_of_two());
            assert!(q as u64 >= r);
            assert!(q <= MAX_SIZE_GIB);
            if q > MIN_SIZE_GIB {
                assert!((q / 2) as u64 < r);
            }
        }
    }

    #[test]
    fn gib_from_bytes_prefers_required_over_limit() {
        let gib = requested_gib_from_bytes(16_106_127_360, 999 * BYTES_PER_GIB as i64).unwrap();
        assert_eq!(gib, 16);
    }

    #[test]
    fn gib_from_bytes_rejects_both_zero() {
        assert!(requested_gib_from_bytes(0, 0).is_err());
    }

    #[test]
    fn gib_from_bytes_falls_back_to_limit() {
        let gib = requested_gib_from_bytes(0, 5 * BYTES_PER_GIB as i64).unwrap();
        assert_eq!(gib, 5);
    }

    #[test]
    fn volume_id_round_trips_through_handle() {
        let id = VolumeId(42);
        let parsed: VolumeId = id.as_handle().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn volume_id_rejects_non_integer_handle() {
        assert!("not-a-number".parse::<VolumeId>().is_err());
    }

    #[test]
    fn performance_class_round_trips() {
        assert_eq!("ssd-plus".parse::<PerformanceClass>().unwrap(), PerformanceClass::SsdPlus);
        assert!("bogus".parse::<PerformanceClass>().is_err());
    }

    #[test]
    fn fs_type_rejects_unsupported() {
        assert!("btrfs".parse::<FsType>().is_err());
    }
}
