// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Controller gRPC service: translates CSI RPCs into
//! `ControllerEngine` calls (§4.2).

use std::collections::HashMap;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::info;

use crate::application::controller_service::{
    CapabilityRequest, ControllerEngine, CreateVolumeParams,
};
use crate::domain::volume::{FsType, PerformanceClass};
use crate::presentation::grpc::csi::controller_server::Controller;
use crate::presentation::grpc::csi::controller_service_capability::{Type as CapType, Rpc as CapRpc};
use crate::presentation::grpc::csi::*;
use crate::presentation::grpc::status::controller_status;

pub struct ControllerService {
    engine: ControllerEngine,
}

fn count_request(method: &'static str) {
    metrics::counter!("emma_csi_grpc_requests_total", "method" => method).increment(1);
}

impl ControllerService {
    pub fn new(engine: ControllerEngine) -> Self {
        Self { engine }
    }

    fn capability_request(cap: &VolumeCapability) -> Result<CapabilityRequest, Status> {
        let single_node_writer = cap
            .access_mode
            .as_ref()
            .map(|m| m.mode == volume_capability::access_mode::Mode::SingleNodeWriter as i32)
            .unwrap_or(false);

        let (is_block, fs_type) = match &cap.access_type {
            Some(volume_capability::AccessType::Block(_)) => (true, None),
            Some(volume_capability::AccessType::Mount(mount)) => (false, Some(mount.fs_type.clone())),
            None => (false, None),
        };

        Ok(CapabilityRequest { single_node_writer, fs_type, is_block })
    }
}

#[tonic::async_trait]
impl Controller for ControllerService {
    async fn create_volume(
        &self,
        request: Request<CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        info!(rpc = "CreateVolume");
        count_request("CreateVolume");
        let req = request.into_inner();

        for cap in &req.volume_capabilities {
            let parsed = Self::capability_request(cap)?;
            ControllerEngine::validate_capability(&parsed).map_err(controller_status)?;
        }

        let params = req.parameters;
        let performance_class: PerformanceClass = params
            .get("type")
            .map(|s| PerformanceClass::from_str(s))
            .transpose()
            .map_err(|e| Status::invalid_argument(e.to_string()))?
            .unwrap_or_default();
        let fs_type: FsType = params
            .get("fsType")
            .map(|s| FsType::from_str(s))
            .transpose()
            .map_err(|e| Status::invalid_argument(e.to_string()))?
            .unwrap_or_default();
        let datacenter_id = params
            .get("dataCenterId")
            .cloned()
            .ok_or_else(|| Status::invalid_argument("dataCenterId parameter is required"))?;

        let (required_bytes, limit_bytes) = req
            .capacity_range
            .map(|r| (r.required_bytes, r.limit_bytes))
            .unwrap_or((0, 0));

        let cancel = CancellationToken::new();
        let created = self
            .engine
            .create_volume(
                &cancel,
                CreateVolumeParams {
                    name: req.name,
                    required_bytes,
                    limit_bytes,
                    performance_class,
                    datacenter_id: datacenter_id.clone(),
                    fs_type,
                },
            )
            .await
            .map_err(controller_status)?;

        let mut volume_context = HashMap::new();
        volume_context.insert("type".to_string(), performance_class.to_string());
        volume_context.insert("dataCenterId".to_string(), datacenter_id);
        volume_context.insert("fsType".to_string(), fs_type.to_string());

        Ok(Response::new(CreateVolumeResponse {
            volume: Some(Volume {
                capacity_bytes: created.size_gib as i64 * (1i64 << 30),
                volume_id: created.volume.id.as_handle(),
                volume_context,
                content_source: None,
                accessible_topology: None,
            }),
        }))
    }

    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        info!(rpc = "DeleteVolume");
        count_request("DeleteVolume");
        let req = request.into_inner();
        let cancel = CancellationToken::new();
        self.engine.delete_volume(&cancel, &req.volume_id).await.map_err(controller_status)?;
        Ok(Response::new(DeleteVolumeResponse {}))
    }

    async fn controller_publish_volume(
        &self,
        request: Request<ControllerPublishVolumeRequest>,
    ) -> Result<Response<ControllerPublishVolumeResponse>, Status> {
        info!(rpc = "ControllerPublishVolume");
        count_request("ControllerPublishVolume");
        let req = request.into_inner();
        let cap = req
            .volume_capability
            .as_ref()
            .map(Self::capability_request)
            .transpose()?
            .unwrap_or(CapabilityRequest { single_node_writer: true, fs_type: None, is_block: false });

        let cancel = CancellationToken::new();
        self.engine
            .publish_volume(&cancel, &req.volume_id, &req.node_id, &cap, || None)
            .await
            .map_err(controller_status)?;

        let mut publish_context = HashMap::new();
        publish_context.insert(
            "devicePath".to_string(),
            format!("/dev/disk/by-id/virtio-{}", req.volume_id),
        );

        Ok(Response::new(ControllerPublishVolumeResponse { publish_context }))
    }

    async fn controller_unpublish_volume(
        &self,
        request: Request<ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<ControllerUnpublishVolumeResponse>, Status> {
        info!(rpc = "ControllerUnpublishVolume");
        count_request("ControllerUnpublishVolume");
        let req = request.into_inner();
        let cancel = CancellationToken::new();
        self.engine
            .unpublish_volume(&cancel, &req.volume_id, &req.node_id, || None)
            .await
            .map_err(controller_status)?;
        Ok(Response::new(ControllerUnpublishVolumeResponse {}))
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        info!(rpc = "ValidateVolumeCapabilities");
        count_request("ValidateVolumeCapabilities");
        let req = request.into_inner();
        for cap in &req.volume_capabilities {
            let parsed = Self::capability_request(cap)?;
            ControllerEngine::validate_capability(&parsed).map_err(controller_status)?;
        }
        Ok(Response::new(ValidateVolumeCapabilitiesResponse {
            confirmed: Some(validate_volume_capabilities_response::Confirmed {
                volume_context: req.volume_context,
                volume_capabilities: req.volume_capabilities,
                parameters: req.parameters,
            }),
            message: String::new(),
        }))
    }

    async fn list_volumes(
        &self,
        request: Request<ListVolumesRequest>,
    ) -> Result<Response<ListVolumesResponse>, Status> {
        info!(rpc = "ListVolumes");
        count_request("ListVolumes");
        let req = request.into_inner();
        if req.max_entries < 0 {
            return Err(Status::invalid_argument("max_entries must not be negative"));
        }

        let (volumes, next_token) = self
            .engine
            .list_volumes(&req.starting_token, req.max_entries as usize)
            .await
            .map_err(controller_status)?;

        let entries = volumes
            .into_iter()
            .map(|volume| {
                let published_node_ids = volume.attached_vm_id.map(|vm| vm.to_string()).into_iter().collect();
                list_volumes_response::Entry {
                    volume: Some(Volume {
                        capacity_bytes: volume.size_gib as i64 * (1i64 << 30),
                        volume_id: volume.id.as_handle(),
                        volume_context: HashMap::new(),
                        content_source: None,
                        accessible_topology: None,
                    }),
                    status: Some(list_volumes_response::VolumeStatus { published_node_ids }),
                }
            })
            .collect();

        Ok(Response::new(ListVolumesResponse { entries, next_token: next_token.unwrap_or_default() }))
    }

    async fn get_capacity(
        &self,
        _request: Request<GetCapacityRequest>,
    ) -> Result<Response<GetCapacityResponse>, Status> {
        Err(Status::unimplemented("GetCapacity is not implemented by this driver"))
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        info!(rpc = "ControllerGetCapabilities");
        count_request("ControllerGetCapabilities");
        let rpc_types = [
            CapRpc::CreateDeleteVolume,
            CapRpc::PublishUnpublishVolume,
            CapRpc::ExpandVolume,
            CapRpc::ListVolumes,
        ];
        let capabilities = rpc_types
            .into_iter()
            .map(|t| ControllerServiceCapability {
                r#type: Some(CapType::Rpc(controller_service_capability::Rpc { r#type: t as i32 })),
            })
            .collect();
        Ok(Response::new(ControllerGetCapabilitiesResponse { capabilities }))
    }

    async fn create_snapshot(
        &self,
        _request: Request<CreateSnapshotRequest>,
    ) -> Result<Response<CreateSnapshotResponse>, Status> {
        Err(Status::unimplemented("snapshots are not supported"))
    }

    async fn delete_snapshot(
        &self,
        _request: Request<DeleteSnapshotRequest>,
    ) -> Result<Response<DeleteSnapshotResponse>, Status> {
        Err(Status::unimplemented("snapshots are not supported"))
    }

    async fn list_snapshots(
        &self,
        _request: Request<ListSnapshotsRequest>,
    ) -> Result<Response<ListSnapshotsResponse>, Status> {
        Err(Status::unimplemented("snapshots are not supported"))
    }

    async fn controller_expand_volume(
        &self,
        request: Request<ControllerExpandVolumeRequest>,
    ) -> Result<Response<ControllerExpandVolumeResponse>, Status> {
        info!(rpc = "ControllerExpandVolume");
        count_request("ControllerExpandVolume");
        let req = request.into_inner();
        let required_bytes = req.capacity_range.map(|r| r.required_bytes).unwrap_or(0);
        let cancel = CancellationToken::new();
        let expanded = self
            .engine
            .expand_volume(&cancel, &req.volume_id, required_bytes)
            .await
            .map_err(controller_status)?;

        Ok(Response::new(ControllerExpandVolumeResponse {
            capacity_bytes: expanded.size_gib as i64 * (1i64 << 30),
            node_expansion_required: expanded.node_expansion_required,
        }))
    }

    async fn controller_get_volume(
        &self,
        _request: Request<ControllerGetVolumeRequest>,
    ) -> Result<Response<ControllerGetVolumeResponse>, Status> {
        Err(Status::unimplemented("ControllerGetVolume is not implemented by this driver"))
    }

    async fn controller_modify_volume(
        &self,
        _request: Request<ControllerModifyVolumeRequest>,
    ) -> Result<Response<ControllerModifyVolumeResponse>, Status> {
        Err(Status::unimplemented("ControllerModifyVolume is not implemented by this driver"))
    }
}
