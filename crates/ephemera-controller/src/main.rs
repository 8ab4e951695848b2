// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ephemera Controller - Ephemeral Browser Session Server
//!
//! An HTTP server responsible for:
//! - Session lifecycle (create, stop, list)
//! - Per-session reverse-proxy routing via container labels
//! - Workload monitoring and recovery across restarts

use std::sync::Arc;
use tracing::{error, info, warn};

use ephemera_controller::config::Config;
use ephemera_controller::launcher::{DockerLauncher, DockerLauncherConfig, WorkloadLauncher};
use ephemera_controller::runtime::ControllerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ephemera_controller=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        image = %config.image,
        network = %config.network,
        "Starting Ephemera Controller"
    );

    if config.uses_default_base_url() {
        warn!(
            proxy_base_url = %config.proxy_base_url,
            "REVERSE_PROXY_BASE_URL not set, session links will only work locally"
        );
    }

    // Create docker launcher and make sure the engine answers
    let launcher = Arc::new(DockerLauncher::new(DockerLauncherConfig::from(&config)));
    if let Err(e) = launcher.ping().await {
        error!(error = %e, "Workload engine unavailable, refusing to start");
        return Err(anyhow::anyhow!("workload engine unavailable: {e}"));
    }
    info!(launcher_type = launcher.launcher_type(), "Launcher initialized");

    // Start the runtime
    let runtime = ControllerRuntime::builder()
        .config(&config)
        .launcher(launcher)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.bind_addr(), "Controller server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    runtime.shutdown().await?;

    info!("Ephemera Controller shut down");

    Ok(())
}
