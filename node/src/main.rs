// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! `emma-csi-node` — the CSI Node plugin. Runs Identity and Node services
//! on a Unix domain socket on each Kubernetes node, discovering attached
//! block devices and driving the mount engine (§4.3).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use emma_csi_core::application::identity_service::{IdentityEngine, ProbeTarget};
use emma_csi_core::application::node_service::NodeEngine;
use emma_csi_core::infrastructure::device::LinuxDeviceDiscovery;
use emma_csi_core::infrastructure::mount::ExecMounter;
use emma_csi_core::presentation::grpc::csi::identity_server::IdentityServer;
use emma_csi_core::presentation::grpc::csi::node_server::NodeServer;
use emma_csi_core::presentation::grpc::identity::IdentityService;
use emma_csi_core::presentation::grpc::node::NodeService;
use emma_csi_core::presentation::grpc::server::serve_uds;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// emma.ms CSI node plugin
#[derive(Parser)]
#[command(name = "emma-csi-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// CSI gRPC listen socket
    #[arg(long, env = "EMMA_CSI_SOCKET", default_value = "/var/run/emma-csi/node.sock")]
    socket: PathBuf,

    /// Kubernetes node name this process runs on
    #[arg(long, env = "EMMA_CSI_NODE_ID")]
    node_id: String,

    /// emma.ms datacenter this node lives in, advertised as topology
    #[arg(long, env = "EMMA_CSI_DATACENTER_ID")]
    datacenter_id: Option<String>,

    /// Address the Prometheus metrics exporter listens on
    #[arg(long, env = "EMMA_CSI_METRICS_ADDR", default_value = "0.0.0.0:9091")]
    metrics_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "EMMA_CSI_NODE_LOG_LEVEL", default_value = "info")]
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

    let identity_engine = IdentityEngine::new(ProbeTarget::Node);
    let node_engine = NodeEngine::new(
        Arc::new(LinuxDeviceDiscovery::default()),
        Arc::new(ExecMounter),
        cli.node_id,
        cli.datacenter_id,
    );

    let router = tonic::transport::Server::builder()
        .add_service(IdentityServer::new(IdentityService::new(identity_engine)))
        .add_service(NodeServer::new(NodeService::new(node_engine)));

    info!("emma.ms CSI node plugin starting");
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
