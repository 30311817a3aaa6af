// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Provider Client: the single point of contact with the external REST
//! API (§4.1). Owns authentication, retries, and status-polling helpers.

use std::time::{Duration as StdDuration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::cluster::Cluster;
use crate::domain::vm::{Vm, VmId};
use crate::domain::volume::{PerformanceClass, Volume, VolumeId, VolumeStatus};
use crate::infrastructure::provider::error::ProviderError;
use crate::infrastructure::provider::models::{
    ClusterDto, CreateVolumeRequest, DataCenterDto, VmAction, VmDto, VolumeAction, VolumeDto,
};
use crate::infrastructure::provider::token::TokenManager;

/// Backoff schedule (seconds) for attach/detach conflict retries (§4.1).
/// The last entry repeats for any retry beyond the table.
const ATTACH_DETACH_SCHEDULE: &[u64] = &[1, 2, 3, 5, 8, 12, 15];
const ATTACH_DETACH_MAX_RETRIES: u32 = 12;

const TRANSIENT_RETRIES: u32 = 3;
const TRANSIENT_DELAY: StdDuration = StdDuration::from_secs(2);

const POLL_INTERVAL: StdDuration = StdDuration::from_secs(5);
pub const DEFAULT_WAIT_BUDGET: StdDuration = StdDuration::from_secs(5 * 60);

fn attach_detach_delay(retry_index: u32) -> StdDuration {
    let secs = ATTACH_DETACH_SCHEDULE
        .get(retry_index as usize)
        .copied()
        .unwrap_or(*ATTACH_DETACH_SCHEDULE.last().unwrap());
    StdDuration::from_secs(secs)
}

pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
}

impl ProviderClient {
    pub fn new(base_url: String, client_id: String, client_secret: String) -> Self {
        let http = reqwest::Client::new();
        let tokens = TokenManager::new(http.clone(), base_url.clone(), client_id, client_secret);
        Self { http, base_url, tokens }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Records `emma_csi_provider_request_duration_seconds` and
    /// `emma_csi_provider_requests_total{operation,outcome}` around a
    /// single provider call (§10.4).
    async fn observe<T, E>(
        operation: &'static str,
        fut: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        let start = Instant::now();
        let result = fut.await;
        metrics::histogram!("emma_csi_provider_request_duration_seconds", "operation" => operation)
            .record(start.elapsed().as_secs_f64());
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("emma_csi_provider_requests_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        result
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        forced_refresh_done: &mut bool,
    ) -> Result<T, ProviderError> {
        let header = self.tokens.bearer_header().await?;
        let response = request
            .try_clone()
            .expect("request bodies in this client are always cloneable JSON")
            .header("Authorization", header)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 && !*forced_refresh_done {
            *forced_refresh_done = true;
            warn!("provider returned 401, forcing token refresh and retrying once");
            let header = self.tokens.force_refresh().await?;
            let response = request
                .header("Authorization", header)
                .send()
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?;
            return Self::parse(response).await;
        }

        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Internal(format!("malformed response body: {e}")));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status, &body))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let mut forced = false;
        self.send(self.http.get(self.url(path)), &mut forced).await
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let mut forced = false;
        self.send(self.http.post(self.url(path)).json(body), &mut forced).await
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let header = self.tokens.bearer_header().await?;
        let response = self
            .http
            .delete(self.url(path))
            .header("Authorization", header)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status, &body))
    }

    // ---- Volume operations (§4.1) ----

    pub async fn create_volume(
        &self,
        name: &str,
        size_gib: u32,
        performance_class: PerformanceClass,
        datacenter_id: &str,
    ) -> Result<Volume, ProviderError> {
        let dto: VolumeDto = Self::observe(
            "create_volume",
            self.post(
                "/v1/volumes",
                &CreateVolumeRequest {
                    name: name.to_string(),
                    volume_gb: size_gib,
                    volume_type: performance_class,
                    data_center_id: datacenter_id.to_string(),
                },
            ),
        )
        .await?;
        Ok(dto.into())
    }

    pub async fn get_volume(&self, id: VolumeId) -> Result<Option<Volume>, ProviderError> {
        match Self::observe("get_volume", self.get::<VolumeDto>(&format!("/v1/volumes/{id}"))).await {
            Ok(dto) => Ok(Some(dto.into())),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_volumes(&self) -> Result<Vec<Volume>, ProviderError> {
        let dtos: Vec<VolumeDto> = self.get("/v1/volumes").await?;
        Ok(dtos.into_iter().map(Volume::from).collect())
    }

    /// Idempotent: a 404 on delete is treated as success (§4.2.2).
    pub async fn delete_volume(&self, id: VolumeId) -> Result<(), ProviderError> {
        Self::observe("delete_volume", self.delete(&format!("/v1/volumes/{id}"))).await
    }

    pub async fn resize_volume(&self, id: VolumeId, new_size_gib: u32) -> Result<(), ProviderError> {
        let _: serde_json::Value = Self::observe(
            "resize_volume",
            self.post(
                &format!("/v1/volumes/{id}/actions"),
                &VolumeAction::Edit { size_gb: new_size_gib },
            ),
        )
        .await?;
        Ok(())
    }

    pub async fn attach_volume(
        &self,
        cancel: &CancellationToken,
        vm_id: VmId,
        volume_id: VolumeId,
    ) -> Result<(), ProviderError> {
        self.mutate_vm_with_retry(cancel, vm_id, VmAction::Attach { volume_id }, "attach")
            .await
    }

    pub async fn detach_volume(
        &self,
        cancel: &CancellationToken,
        vm_id: VmId,
        volume_id: VolumeId,
    ) -> Result<(), ProviderError> {
        self.mutate_vm_with_retry(cancel, vm_id, VmAction::Detach { volume_id }, "detach")
            .await
    }

    async fn mutate_vm_with_retry(
        &self,
        cancel: &CancellationToken,
        vm_id: VmId,
        action: VmAction,
        op: &'static str,
    ) -> Result<(), ProviderError> {
        let path = format!("/v1/vms/{vm_id}/actions");
        let mut retry = 0u32;
        loop {
            let attempt: Result<serde_json::Value, ProviderError> = Self::observe(op, self.post(&path, &action)).await;
            match attempt {
                Ok(_) => return Ok(()),
                Err(ProviderError::FailedPrecondition(msg)) if retry < ATTACH_DETACH_MAX_RETRIES => {
                    warn!(operation = op, retry, "vm transitional conflict, retrying");
                    metrics::counter!("emma_csi_provider_retries_total", "operation" => op).increment(1);
                    let delay = attach_detach_delay(retry);
                    retry += 1;
                    if !Self::sleep_cancellable(cancel, delay).await {
                        return Err(ProviderError::Cancelled);
                    }
                    let _ = msg;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get_vm(&self, id: VmId) -> Result<Vm, ProviderError> {
        let dto: VmDto = self.get(&format!("/v1/vms/{id}")).await?;
        Ok(dto.into())
    }

    pub async fn list_kubernetes_clusters(&self) -> Result<Vec<Cluster>, ProviderError> {
        let dtos: Vec<ClusterDto> = self.get("/v1/kubernetes").await?;
        Ok(dtos.into_iter().map(Cluster::from).collect())
    }

    pub async fn get_data_centers(&self) -> Result<Vec<String>, ProviderError> {
        let dtos: Vec<DataCenterDto> = self.get("/v1/data-centers").await?;
        Ok(dtos.into_iter().map(|dc| dc.id).collect())
    }

    pub async fn validate_data_center(&self, id: &str) -> Result<(), ProviderError> {
        match self.get::<DataCenterDto>(&format!("/v1/data-centers/{id}")).await {
            Ok(_) => Ok(()),
            Err(ProviderError::NotFound(_)) => {
                Err(ProviderError::InvalidArgument(format!("unknown data center '{id}'")))
            }
            Err(e) => Err(e),
        }
    }

    // ---- Polling helpers (§4.1, §5) ----

    pub async fn wait_for_volume_status(
        &self,
        cancel: &CancellationToken,
        id: VolumeId,
        desired: VolumeStatus,
        budget: StdDuration,
    ) -> Result<Volume, ProviderError> {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            let volume = self
                .get_volume(id)
                .await?
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

            if volume.status == desired {
                return Ok(volume);
            }
            if volume.status == VolumeStatus::Failed {
                return Err(ProviderError::VolumeFailed(id.to_string()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Deadline(format!(
                    "timed out waiting for volume {id} to reach {desired:?}"
                )));
            }
            debug!(volume = %id, status = ?volume.status, desired = ?desired, "polling volume status");
            if !Self::sleep_cancellable(cancel, POLL_INTERVAL).await {
                return Err(ProviderError::Cancelled);
            }
        }
    }

    pub async fn wait_for_volume_attachment(
        &self,
        cancel: &CancellationToken,
        id: VolumeId,
        vm_id: VmId,
        budget: StdDuration,
    ) -> Result<Volume, ProviderError> {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            let volume = self
                .get_volume(id)
                .await?
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

            if volume.status == VolumeStatus::Active && volume.attached_vm_id == Some(vm_id) {
                return Ok(volume);
            }
            if volume.status == VolumeStatus::Failed {
                return Err(ProviderError::VolumeFailed(id.to_string()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Deadline(format!(
                    "timed out waiting for volume {id} to attach to vm {vm_id}"
                )));
            }
            if !Self::sleep_cancellable(cancel, POLL_INTERVAL).await {
                return Err(ProviderError::Cancelled);
            }
        }
    }

    pub async fn wait_for_volume_detachment(
        &self,
        cancel: &CancellationToken,
        id: VolumeId,
        budget: StdDuration,
    ) -> Result<Volume, ProviderError> {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            let volume = self
                .get_volume(id)
                .await?
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

            if volume.status == VolumeStatus::Available && volume.attached_vm_id.is_none() {
                return Ok(volume);
            }
            if volume.status == VolumeStatus::Failed {
                return Err(ProviderError::VolumeFailed(id.to_string()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Deadline(format!(
                    "timed out waiting for volume {id} to detach"
                )));
            }
            if !Self::sleep_cancellable(cancel, POLL_INTERVAL).await {
                return Err(ProviderError::Cancelled);
            }
        }
    }

    /// Retry a transient-4xx-prone call (e.g. a create that races provider
    /// quota bookkeeping) up to [`TRANSIENT_RETRIES`] times at a fixed delay.
    pub async fn retry_transient<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        mut f: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    metrics::counter!("emma_csi_provider_retries_total", "operation" => operation).increment(1);
                    if !Self::sleep_cancellable(cancel, TRANSIENT_DELAY).await {
                        return Err(ProviderError::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleeps for `duration` unless `cancel` fires first; returns `false`
    /// if cancelled.
    async fn sleep_cancellable(cancel: &CancellationToken, duration: StdDuration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: String) -> ProviderClient {
        ProviderClient::new(base_url, "id".into(), "secret".into())
    }

    async fn with_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/v1/issue-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accessToken":"tok","refreshToken":"ref","expiresIn":3600}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn get_volume_maps_404_to_none() {
        let mut server = mockito::Server::new_async().await;
        let _issue = with_token(&mut server).await;
        let _vol = server.mock("GET", "/v1/volumes/9").with_status(404).create_async().await;

        let client = client(server.url());
        let result = client.get_volume(VolumeId(9)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_volume_is_idempotent_on_404() {
        let mut server = mockito::Server::new_async().await;
        let _issue = with_token(&mut server).await;
        let _del = server.mock("DELETE", "/v1/volumes/5").with_status(404).create_async().await;

        let client = client(server.url());
        assert!(client.delete_volume(VolumeId(5)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn attach_retries_on_409_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let _issue = with_token(&mut server).await;

        // mockito checks mocks most-recently-created first, so the success
        // mock (registered first) is the fallback once the conflict mock
        // (registered second) exhausts its two expected matches.
        let _ok = server
            .mock("POST", "/v1/vms/1/actions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;
        let _conflict = server
            .mock("POST", "/v1/vms/1/actions")
            .with_status(409)
            .with_body("transitional")
            .expect(2)
            .create_async()
            .await;

        let client = client(server.url());
        let cancel = CancellationToken::new();
        client.attach_volume(&cancel, VmId(1), VolumeId(7)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn attach_gives_up_after_retry_budget() {
        let mut server = mockito::Server::new_async().await;
        let _issue = with_token(&mut server).await;
        let _conflict = server
            .mock("POST", "/v1/vms/1/actions")
            .with_status(409)
            .with_body("transitional")
            .expect_at_least(ATTACH_DETACH_MAX_RETRIES as usize + 1)
            .create_async()
            .await;

        let client = client(server.url());
        let cancel = CancellationToken::new();
        let err = client.attach_volume(&cancel, VmId(1), VolumeId(7)).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }
}
