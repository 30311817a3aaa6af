// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Node gRPC service: translates CSI RPCs into `NodeEngine` calls (§4.3).

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::info;

use crate::application::node_service::NodeEngine;
use crate::domain::volume::FsType;
use crate::presentation::grpc::csi::node_server::Node;
use crate::presentation::grpc::csi::node_service_capability::{Rpc as CapRpc, Type as CapType};
use crate::presentation::grpc::csi::*;
use crate::presentation::grpc::status::node_status;

pub struct NodeService {
    engine: NodeEngine,
}

fn count_request(method: &'static str) {
    metrics::counter!("emma_csi_grpc_requests_total", "method" => method).increment(1);
}

impl NodeService {
    pub fn new(engine: NodeEngine) -> Self {
        Self { engine }
    }

    /// Rejects any requested fs type other than ext4/xfs (§4.3.2, §8.8);
    /// an unset fs type falls back to the default rather than an error.
    fn resolve_fs_type(cap: &Option<VolumeCapability>) -> Result<FsType, Status> {
        let requested = cap.as_ref().and_then(|c| match &c.access_type {
            Some(volume_capability::AccessType::Mount(mount)) if !mount.fs_type.is_empty() => {
                Some(mount.fs_type.clone())
            }
            _ => None,
        });

        match requested {
            None => Ok(FsType::default()),
            Some(fs_type) => FsType::from_str(&fs_type)
                .map_err(|e| Status::invalid_argument(e.to_string())),
        }
    }

    fn mount_flags(cap: &Option<VolumeCapability>) -> Vec<String> {
        cap.as_ref()
            .and_then(|c| match &c.access_type {
                Some(volume_capability::AccessType::Mount(mount)) => Some(mount.mount_flags.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[tonic::async_trait]
impl Node for NodeService {
    async fn node_stage_volume(
        &self,
        request: Request<NodeStageVolumeRequest>,
    ) -> Result<Response<NodeStageVolumeResponse>, Status> {
        info!(rpc = "NodeStageVolume");
        count_request("NodeStageVolume");
        let req = request.into_inner();
        if req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument("staging_target_path is required"));
        }

        let fs_type = Self::resolve_fs_type(&req.volume_capability)?;
        let mount_options = Self::mount_flags(&req.volume_capability);
        let cancel = CancellationToken::new();

        self.engine
            .stage_volume(
                &cancel,
                &req.volume_id,
                &PathBuf::from(&req.staging_target_path),
                fs_type,
                &mount_options,
            )
            .await
            .map_err(node_status)?;

        Ok(Response::new(NodeStageVolumeResponse {}))
    }

    async fn node_unstage_volume(
        &self,
        request: Request<NodeUnstageVolumeRequest>,
    ) -> Result<Response<NodeUnstageVolumeResponse>, Status> {
        info!(rpc = "NodeUnstageVolume");
        count_request("NodeUnstageVolume");
        let req = request.into_inner();
        if req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument("staging_target_path is required"));
        }
        self.engine
            .unstage_volume(&PathBuf::from(&req.staging_target_path))
            .await
            .map_err(node_status)?;
        Ok(Response::new(NodeUnstageVolumeResponse {}))
    }

    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> Result<Response<NodePublishVolumeResponse>, Status> {
        info!(rpc = "NodePublishVolume");
        count_request("NodePublishVolume");
        let req = request.into_inner();
        if req.staging_target_path.is_empty() || req.target_path.is_empty() {
            return Err(Status::invalid_argument("staging_target_path and target_path are required"));
        }
        self.engine
            .publish_volume(
                &PathBuf::from(&req.staging_target_path),
                &PathBuf::from(&req.target_path),
                req.readonly,
            )
            .await
            .map_err(node_status)?;
        Ok(Response::new(NodePublishVolumeResponse {}))
    }

    async fn node_unpublish_volume(
        &self,
        request: Request<NodeUnpublishVolumeRequest>,
    ) -> Result<Response<NodeUnpublishVolumeResponse>, Status> {
        info!(rpc = "NodeUnpublishVolume");
        count_request("NodeUnpublishVolume");
        let req = request.into_inner();
        if req.target_path.is_empty() {
            return Err(Status::invalid_argument("target_path is required"));
        }
        self.engine.unpublish_volume(&PathBuf::from(&req.target_path)).await.map_err(node_status)?;
        Ok(Response::new(NodeUnpublishVolumeResponse {}))
    }

    async fn node_get_volume_stats(
        &self,
        request: Request<NodeGetVolumeStatsRequest>,
    ) -> Result<Response<NodeGetVolumeStatsResponse>, Status> {
        info!(rpc = "NodeGetVolumeStats");
        count_request("NodeGetVolumeStats");
        let req = request.into_inner();
        let path = if !req.volume_path.is_empty() { req.volume_path } else { req.staging_target_path };
        if path.is_empty() {
            return Err(Status::invalid_argument("volume_path is required"));
        }

        let stats = self.engine.volume_stats(&PathBuf::from(&path)).map_err(node_status)?;

        let usage = vec![
            VolumeUsage {
                available: stats.available_bytes,
                total: stats.total_bytes,
                used: stats.used_bytes,
                unit: volume_usage::Unit::Bytes as i32,
            },
            VolumeUsage {
                available: stats.available_inodes,
                total: stats.total_inodes,
                used: stats.used_inodes,
                unit: volume_usage::Unit::Inodes as i32,
            },
        ];

        Ok(Response::new(NodeGetVolumeStatsResponse { usage, volume_condition: None }))
    }

    async fn node_expand_volume(
        &self,
        request: Request<NodeExpandVolumeRequest>,
    ) -> Result<Response<NodeExpandVolumeResponse>, Status> {
        info!(rpc = "NodeExpandVolume");
        count_request("NodeExpandVolume");
        let req = request.into_inner();
        let path = if !req.volume_path.is_empty() { req.volume_path } else { req.staging_target_path };
        if path.is_empty() {
            return Err(Status::invalid_argument("volume_path is required"));
        }

        let fs_type = Self::resolve_fs_type(&req.volume_capability)?;
        let capacity_bytes = req.capacity_range.map(|r| r.required_bytes).unwrap_or(0);
        let cancel = CancellationToken::new();

        self.engine
            .expand_volume(&cancel, &req.volume_id, &PathBuf::from(&path), fs_type)
            .await
            .map_err(node_status)?;

        Ok(Response::new(NodeExpandVolumeResponse { capacity_bytes }))
    }

    async fn node_get_capabilities(
        &self,
        _request: Request<NodeGetCapabilitiesRequest>,
    ) -> Result<Response<NodeGetCapabilitiesResponse>, Status> {
        info!(rpc = "NodeGetCapabilities");
        count_request("NodeGetCapabilities");
        let rpc_types = [CapRpc::StageUnstageVolume, CapRpc::GetVolumeStats, CapRpc::ExpandVolume];
        let capabilities = rpc_types
            .into_iter()
            .map(|t| NodeServiceCapability {
                r#type: Some(CapType::Rpc(node_service_capability::Rpc { r#type: t as i32 })),
            })
            .collect();
        Ok(Response::new(NodeGetCapabilitiesResponse { capabilities }))
    }

    async fn node_get_info(
        &self,
        _request: Request<NodeGetInfoRequest>,
    ) -> Result<Response<NodeGetInfoResponse>, Status> {
        info!(rpc = "NodeGetInfo");
        count_request("NodeGetInfo");
        let info = self.engine.get_info();
        let accessible_topology = info.datacenter_topology.map(|(key, value)| {
            let mut segments = HashMap::new();
            segments.insert(key, value);
            Topology { segments }
        });

        Ok(Response::new(NodeGetInfoResponse {
            node_id: info.node_id,
            max_volumes_per_node: info.max_volumes_per_node,
            accessible_topology,
        }))
    }
}
