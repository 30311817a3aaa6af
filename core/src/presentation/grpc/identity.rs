// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Identity gRPC service: static driver metadata plus the readiness
//! probe (§4.4).

use tonic::{Request, Response, Status};
use tracing::info;

use crate::application::identity_service::{IdentityEngine, DRIVER_NAME, DRIVER_VERSION};
use crate::presentation::grpc::csi::identity_server::Identity;
use crate::presentation::grpc::csi::plugin_capability::{Service, Type as ServiceType};
use crate::presentation::grpc::csi::{
    plugin_capability, GetPluginCapabilitiesRequest, GetPluginCapabilitiesResponse, GetPluginInfoRequest,
    GetPluginInfoResponse, PluginCapability, ProbeRequest, ProbeResponse,
};

pub struct IdentityService {
    engine: IdentityEngine,
}

fn count_request(method: &'static str) {
    metrics::counter!("emma_csi_grpc_requests_total", "method" => method).increment(1);
}

impl IdentityService {
    pub fn new(engine: IdentityEngine) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl Identity for IdentityService {
    async fn get_plugin_info(
        &self,
        _request: Request<GetPluginInfoRequest>,
    ) -> Result<Response<GetPluginInfoResponse>, Status> {
        info!(rpc = "GetPluginInfo");
        count_request("GetPluginInfo");
        Ok(Response::new(GetPluginInfoResponse {
            name: DRIVER_NAME.to_string(),
            vendor_version: DRIVER_VERSION.to_string(),
            manifest: Default::default(),
        }))
    }

    async fn get_plugin_capabilities(
        &self,
        _request: Request<GetPluginCapabilitiesRequest>,
    ) -> Result<Response<GetPluginCapabilitiesResponse>, Status> {
        info!(rpc = "GetPluginCapabilities");
        count_request("GetPluginCapabilities");
        let capabilities = [ServiceType::ControllerService, ServiceType::VolumeAccessibilityConstraints]
            .into_iter()
            .map(|service_type| PluginCapability {
                r#type: Some(plugin_capability::Type::Service(Service { r#type: service_type as i32 })),
            })
            .collect();
        Ok(Response::new(GetPluginCapabilitiesResponse { capabilities }))
    }

    async fn probe(&self, _request: Request<ProbeRequest>) -> Result<Response<ProbeResponse>, Status> {
        info!(rpc = "Probe");
        count_request("Probe");
        let ready = self.engine.probe().await;
        Ok(Response::new(ProbeResponse { ready: Some(ready) }))
    }
}
