// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload Monitor
//!
//! Background task that detects sessions whose workload vanished without a
//! stop request (the browser process exited and the engine auto-removed the
//! container) and drops them from the registry, so the session list never
//! advertises a route to nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::manager::SessionManager;

/// Configuration for the workload monitor.
#[derive(Debug, Clone)]
pub struct WorkloadMonitorConfig {
    /// How often to check registered sessions.
    pub poll_interval: Duration,
}

impl Default for WorkloadMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Background worker that reconciles the registry with the engine.
pub struct WorkloadMonitor {
    manager: Arc<SessionManager>,
    config: WorkloadMonitorConfig,
    shutdown: Arc<Notify>,
}

impl WorkloadMonitor {
    /// Create a new workload monitor.
    pub fn new(manager: Arc<SessionManager>, config: WorkloadMonitorConfig) -> Self {
        Self {
            manager,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the monitor loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Workload monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Workload monitor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.check_once().await;
                }
            }
        }

        info!("Workload monitor stopped");
    }

    /// Run a single reconciliation pass.
    pub async fn check_once(&self) -> usize {
        match self.manager.reconcile().await {
            Ok(0) => {
                debug!("All registered sessions have live workloads");
                0
            }
            Ok(dropped) => {
                info!(dropped, "Removed sessions with vanished workloads");
                dropped
            }
            Err(Error::EngineUnavailable(message)) => {
                warn!(error = %message, "Workload engine unavailable, skipping check");
                0
            }
            Err(e) => {
                error!(error = %e, "Failed to reconcile sessions");
                0
            }
        }
    }
}
