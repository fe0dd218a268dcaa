//! gip — remote iptables control plane
//!
//! Loads the config named by `CONFIG_FILE`, binds the configured port and
//! serves the IPTables gRPC service until the transport fails.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gip::config::{self, Config, LoggingConfig};
use gip::executor::ProcessRunner;
use gip::interfaces;
use gip::GipServer;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config::config_path();
    config::validate_config_path(&config_path)?;
    let config = Config::load(&config_path)?;

    init_tracing(&config.logging);
    info!("gip starting with config {}", config_path.display());

    match interfaces::system_interfaces() {
        Ok(names) => info!(interfaces = ?names, "Host interfaces available for forwarding rules"),
        Err(e) => warn!("Could not enumerate host interfaces: {e:#}"),
    }

    let ipt = &config.iptables;
    let runner = Arc::new(ProcessRunner::new(ipt.exec.timeout()));
    let server = GipServer::from_config(ipt, runner).context("Failed to set up gRPC server")?;

    let bound = server
        .bind(ipt.domain.listen_addr())
        .await
        .context("Failed to listen")?;
    info!("gip: gRPC service is running at port {}", ipt.domain.port);

    bound.serve().await.context("gip gRPC server failed")?;
    Ok(())
}
