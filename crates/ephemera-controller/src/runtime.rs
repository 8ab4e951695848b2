// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for ephemera-controller.
//!
//! [`ControllerRuntime`] wires the lifecycle manager, the workload monitor,
//! session recovery and the HTTP server together, so the controller can run
//! inside an existing tokio application as well as standalone.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ephemera_controller::config::Config;
//! use ephemera_controller::launcher::{DockerLauncher, DockerLauncherConfig};
//! use ephemera_controller::runtime::ControllerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let runtime = ControllerRuntime::builder()
//!         .config(&config)
//!         .launcher(Arc::new(DockerLauncher::new(DockerLauncherConfig::from(&config))))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ManagerConfig};
use crate::handlers::ControllerState;
use crate::launcher::WorkloadLauncher;
use crate::manager::SessionManager;
use crate::monitor::{WorkloadMonitor, WorkloadMonitorConfig};
use crate::server::run_server_with_shutdown;
use crate::store::{JsonFileStore, SessionStore};

/// Builder for creating a [`ControllerRuntime`].
pub struct ControllerRuntimeBuilder {
    launcher: Option<Arc<dyn WorkloadLauncher>>,
    store: Option<Arc<dyn SessionStore>>,
    manager_config: ManagerConfig,
    bind_addr: SocketAddr,
    proxy_base_url: String,
    monitor_interval: Option<Duration>,
    stop_on_shutdown: bool,
}

impl Default for ControllerRuntimeBuilder {
    fn default() -> Self {
        Self {
            launcher: None,
            store: None,
            manager_config: ManagerConfig::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            proxy_base_url: crate::config::DEFAULT_PROXY_BASE_URL.to_string(),
            monitor_interval: Some(Duration::from_secs(30)),
            stop_on_shutdown: false,
        }
    }
}

impl ControllerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every setting from a loaded [`Config`].
    ///
    /// A configured `state_file` installs a [`JsonFileStore`].
    pub fn config(mut self, config: &Config) -> Self {
        self.manager_config = ManagerConfig::from(config);
        self.bind_addr = config.http_addr;
        self.proxy_base_url = config.proxy_base_url.clone();
        self.monitor_interval = config.monitor_interval;
        self.stop_on_shutdown = config.stop_on_shutdown;
        if let Some(path) = &config.state_file {
            self.store = Some(Arc::new(JsonFileStore::new(path)));
        }
        self
    }

    /// Set the workload launcher (required).
    pub fn launcher(mut self, launcher: Arc<dyn WorkloadLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Set the session store used for recovery across restarts.
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the lifecycle manager settings.
    pub fn manager_config(mut self, config: ManagerConfig) -> Self {
        self.manager_config = config;
        self
    }

    /// Set the bind address for the HTTP server.
    ///
    /// Default: `0.0.0.0:5000`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the public base URL of the reverse proxy.
    ///
    /// Default: `http://localhost`
    pub fn proxy_base_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_base_url = url.into();
        self
    }

    /// Set the workload monitor interval (`None` disables the monitor).
    ///
    /// Default: 30 seconds
    pub fn monitor_interval(mut self, interval: Option<Duration>) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Stop every session during shutdown.
    ///
    /// Default: `false`
    pub fn stop_on_shutdown(mut self, stop: bool) -> Self {
        self.stop_on_shutdown = stop;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ControllerRuntimeConfig> {
        let launcher = self
            .launcher
            .ok_or_else(|| anyhow::anyhow!("launcher is required"))?;

        Ok(ControllerRuntimeConfig {
            launcher,
            store: self.store,
            manager_config: self.manager_config,
            bind_addr: self.bind_addr,
            proxy_base_url: self.proxy_base_url,
            monitor_interval: self.monitor_interval,
            stop_on_shutdown: self.stop_on_shutdown,
        })
    }
}

/// Configuration for a [`ControllerRuntime`].
pub struct ControllerRuntimeConfig {
    launcher: Arc<dyn WorkloadLauncher>,
    store: Option<Arc<dyn SessionStore>>,
    manager_config: ManagerConfig,
    bind_addr: SocketAddr,
    proxy_base_url: String,
    monitor_interval: Option<Duration>,
    stop_on_shutdown: bool,
}

impl ControllerRuntimeConfig {
    /// Start the runtime: recover stored sessions, bind the HTTP listener,
    /// then spawn the monitor and the server.
    pub async fn start(self) -> Result<ControllerRuntime> {
        let mut manager = SessionManager::new(self.manager_config, self.launcher.clone());
        if let Some(store) = &self.store {
            manager = manager.with_store(store.clone());
        }
        let manager = Arc::new(manager);

        if let Some(store) = &self.store {
            recover_sessions(&manager, store.as_ref()).await?;
        }

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", self.bind_addr, e))?;
        let bind_addr = listener.local_addr()?;

        let monitor = self.monitor_interval.map(|poll_interval| {
            let monitor =
                WorkloadMonitor::new(manager.clone(), WorkloadMonitorConfig { poll_interval });
            let shutdown = monitor.shutdown_handle();
            let handle = tokio::spawn(async move {
                monitor.run().await;
            });
            (handle, shutdown)
        });
        if monitor.is_none() {
            debug!("Workload monitor disabled");
        }

        let state = Arc::new(ControllerState::new(
            manager.clone(),
            self.proxy_base_url.clone(),
        ));

        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(run_server_with_shutdown(
            listener,
            state.clone(),
            server_shutdown_rx,
        ));

        info!(
            bind_addr = %bind_addr,
            launcher = self.launcher.launcher_type(),
            proxy_base_url = %self.proxy_base_url,
            monitor = monitor.is_some(),
            "ControllerRuntime started"
        );

        Ok(ControllerRuntime {
            server_handle,
            monitor,
            server_shutdown_tx,
            state,
            bind_addr,
            stop_on_shutdown: self.stop_on_shutdown,
        })
    }
}

/// A running controller that can be embedded in an application.
///
/// The runtime manages:
/// - HTTP server for the front end
/// - Workload monitor (optional)
/// - Session recovery from the configured store (at start)
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ControllerRuntime {
    server_handle: JoinHandle<Result<()>>,
    monitor: Option<(JoinHandle<()>, Arc<Notify>)>,
    server_shutdown_tx: watch::Sender<bool>,
    state: Arc<ControllerState>,
    bind_addr: SocketAddr,
    stop_on_shutdown: bool,
}

impl ControllerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ControllerRuntimeBuilder {
        ControllerRuntimeBuilder::new()
    }

    /// Get the bind address of the HTTP server.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Get a reference to the shared handler state.
    pub fn state(&self) -> &Arc<ControllerState> {
        &self.state
    }

    /// Get the lifecycle manager.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.state.manager
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        let monitor_running = self
            .monitor
            .as_ref()
            .is_none_or(|(handle, _)| !handle.is_finished());
        !self.server_handle.is_finished() && monitor_running
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals the HTTP server and the workload monitor to stop, optionally
    /// stops every session, then waits for the tasks to complete.
    pub async fn shutdown(self) -> Result<()> {
        info!("ControllerRuntime shutting down...");

        let _ = self.server_shutdown_tx.send(true);

        if let Some((handle, shutdown)) = self.monitor {
            shutdown.notify_one();
            if let Err(e) = handle.await {
                error!("Workload monitor task panicked: {}", e);
            }
        }

        if self.stop_on_shutdown {
            let stopped = self.state.manager.stop_all().await;
            info!(stopped, "Stopped sessions on shutdown");
        }

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("ControllerRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("ControllerRuntime server error during shutdown: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("ControllerRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }
}

/// Recover sessions saved by a previous run.
///
/// Sessions whose workload is still live are re-registered; the rest are
/// dropped. A missing or unreadable snapshot is not fatal.
async fn recover_sessions(manager: &SessionManager, store: &dyn SessionStore) -> Result<()> {
    let records = match store.load().await {
        Ok(records) => records,
        Err(e) => {
            warn!(store = store.store_type(), error = %e, "Failed to load stored sessions");
            return Ok(());
        }
    };

    if records.is_empty() {
        debug!("No stored sessions to recover");
        return Ok(());
    }

    info!(count = records.len(), "Checking stored sessions for recovery");
    let restored = manager.restore(records).await?;
    info!(restored, "Session recovery complete");
    Ok(())
}
