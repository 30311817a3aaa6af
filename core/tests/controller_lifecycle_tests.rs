// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! End-to-end `ControllerEngine` tests against a `mockito`-mocked provider
//! API, covering the idempotent delete/unpublish paths (§4.2.2, §4.2.4)
//! and the create-then-wait-to-AVAILABLE flow (§4.2.1).

use std::sync::Arc;

use emma_csi_core::application::controller_service::{ControllerEngine, CreateVolumeParams};
use emma_csi_core::domain::volume::{FsType, PerformanceClass};
use emma_csi_core::infrastructure::provider::ProviderClient;
use tokio_util::sync::CancellationToken;

fn engine(base_url: String) -> ControllerEngine {
    ControllerEngine::new(Arc::new(ProviderClient::new(base_url, "id".into(), "secret".into())))
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
async fn delete_volume_on_already_gone_volume_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    let _issue = with_token(&mut server).await;
    let _get = server.mock("GET", "/v1/volumes/42").with_status(404).create_async().await;

    let engine = engine(server.url());
    let cancel = CancellationToken::new();
    let result = engine.delete_volume(&cancel, "42").await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn unpublish_when_already_detached_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    let _issue = with_token(&mut server).await;
    let _get = server
        .mock("GET", "/v1/volumes/7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":7,"name":"vol-7","volumeGb":16,"volumeType":"ssd","dataCenterId":"fra1","attachedVmId":null,"status":"AVAILABLE"}"#,
        )
        .create_async()
        .await;

    let engine = engine(server.url());
    let cancel = CancellationToken::new();
    let result = engine.unpublish_volume(&cancel, "7", "501", || None).await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn unpublish_when_attached_to_a_different_vm_is_a_no_op() {
    let mut server = mockito::Server::new_async().await;
    let _issue = with_token(&mut server).await;
    let _get = server
        .mock("GET", "/v1/volumes/7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":7,"name":"vol-7","volumeGb":16,"volumeType":"ssd","dataCenterId":"fra1","attachedVmId":999,"status":"ACTIVE"}"#,
        )
        .create_async()
        .await;

    let engine = engine(server.url());
    let cancel = CancellationToken::new();
    let result = engine.unpublish_volume(&cancel, "7", "501", || None).await;

    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn create_volume_waits_for_available_then_returns_quantised_size() {
    let mut server = mockito::Server::new_async().await;
    let _issue = with_token(&mut server).await;
    let _dc = server
        .mock("GET", "/v1/data-centers/fra1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"fra1","name":"Frankfurt"}"#)
        .create_async()
        .await;
    let _create = server
        .mock("POST", "/v1/volumes")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":10,"name":"pvc-1","volumeGb":16,"volumeType":"ssd","dataCenterId":"fra1","attachedVmId":null,"status":"DRAFT"}"#,
        )
        .create_async()
        .await;
    let _get = server
        .mock("GET", "/v1/volumes/10")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":10,"name":"pvc-1","volumeGb":16,"volumeType":"ssd","dataCenterId":"fra1","attachedVmId":null,"status":"AVAILABLE"}"#,
        )
        .create_async()
        .await;

    let engine = engine(server.url());
    let cancel = CancellationToken::new();
    let params = CreateVolumeParams {
        name: "pvc-1".to_string(),
        required_bytes: 15 * (1 << 30),
        limit_bytes: 0,
        performance_class: PerformanceClass::Ssd,
        datacenter_id: "fra1".to_string(),
        fs_type: FsType::Ext4,
    };

    let created = engine.create_volume(&cancel, params).await.unwrap();
    assert_eq!(created.size_gib, 16);
    assert_eq!(created.volume.id.as_handle(), "10");
}

#[tokio::test]
async fn create_volume_rejects_unknown_data_center() {
    let mut server = mockito::Server::new_async().await;
    let _issue = with_token(&mut server).await;
    let _dc = server.mock("GET", "/v1/data-centers/nowhere").with_status(404).create_async().await;

    let engine = engine(server.url());
    let cancel = CancellationToken::new();
    let params = CreateVolumeParams {
        name: "pvc-2".to_string(),
        required_bytes: 1 << 30,
        limit_bytes: 0,
        performance_class: PerformanceClass::Ssd,
        datacenter_id: "nowhere".to_string(),
        fs_type: FsType::Ext4,
    };

    let err = engine.create_volume(&cancel, params).await.unwrap_err();
    assert!(matches!(
        err,
        emma_csi_core::application::controller_service::ControllerError::InvalidArgument(_)
    ));
}
