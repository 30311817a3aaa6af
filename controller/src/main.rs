// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! `emma-csi-controller` — the CSI Controller plugin. Runs Identity and
//! Controller services on a Unix domain socket, talking to the emma.ms
//! provider API on behalf of the cluster's external-provisioner /
//! external-attacher sidecars.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use emma_csi_core::application::controller_service::ControllerEngine;
use emma_csi_core::application::identity_service::{IdentityEngine, ProbeTarget};
use emma_csi_core::infrastructure::provider::ProviderClient;
use emma_csi_core::presentation::grpc::csi::controller_server::ControllerServer;
use emma_csi_core::presentation::grpc::csi::identity_server::IdentityServer;
use emma_csi_core::presentation::grpc::controller::ControllerService;
use emma_csi_core::presentation::grpc::identity::IdentityService;
use emma_csi_core::presentation::grpc::server::serve_uds;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// emma.ms CSI controller plugin
#[derive(Parser)]
#[command(name = "emma-csi-controller")]
#[command(version, about, long_about = None)]
struct Cli {
    /// CSI gRPC listen socket
    #[arg(long, env = "EMMA_CSI_SOCKET", default_value = "/var/run/emma-csi/controller.sock")]
    socket: PathBuf,

    /// Base URL of the emma.ms provider API
    #[arg(long, env = "EMMA_CSI_PROVIDER_URL")]
    provider_url: String,

    /// OAuth client id issued for this driver
    #[arg(long, env = "EMMA_CSI_CLIENT_ID")]
    client_id: String,

    /// OAuth client secret issued for this driver
    #[arg(long, env = "EMMA_CSI_CLIENT_SECRET")]
    client_secret: String,

    /// Address the Prometheus metrics exporter listens on
    #[arg(long, env = "EMMA_CSI_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "EMMA_CSI_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON instead of the compact human format
    #[arg(long, env = "EMMA_CSI_JSON_LOG", default_value_t = false)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_log)?;

    PrometheusBuilder::new()
        .with_http_listener(cli.metrics_addr)
        .install()
        .context("failed to install Prometheus metrics exporter")?;
    info!(addr = %cli.metrics_addr, "metrics exporter listening");

    let provider = Arc::new(ProviderClient::new(cli.provider_url, cli.client_id, cli.client_secret));

    let identity_engine = IdentityEngine::new(ProbeTarget::Controller(provider.clone()));
    let controller_engine = ControllerEngine::new(provider.clone());

    let router = tonic::transport::Server::builder()
        .add_service(IdentityServer::new(IdentityService::new(identity_engine)))
        .add_service(ControllerServer::new(ControllerService::new(controller_engine)));

    info!("emma.ms CSI controller starting");
    serve_uds(router, &cli.socket).await
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to build log filter")?;

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    Ok(())
}
