// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launcher trait definitions.
//!
//! Defines the abstract interface to the workload engine.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::RouteDescriptor;

/// Errors from launcher operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LauncherError {
    /// The engine has no workload with this name or id.
    #[error("Workload not found: {0}")]
    NotFound(String),

    /// Workload creation failed (image pull, missing network, name collision, ...).
    #[error("Launch failed: {0}")]
    Launch(String),

    /// Stopping a known workload failed.
    #[error("Stop failed: {0}")]
    Stop(String),

    /// Removing a workload failed.
    #[error("Remove failed: {0}")]
    Remove(String),

    /// The engine cannot be reached at all.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// The engine did not answer within the allowed time.
    #[error("Engine call timed out after {0:?}")]
    Timeout(Duration),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other engine error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for launcher operations.
pub type Result<T> = std::result::Result<T, LauncherError>;

/// Everything needed to launch one session workload. Built fresh per launch.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Image reference
    pub image: String,
    /// Deterministic container name
    pub container_name: String,
    /// Proxy route; serialized to labels only by the adapter
    pub route: RouteDescriptor,
    /// Network shared with the proxy
    pub network: String,
    /// Environment variables for the workload
    pub env: BTreeMap<String, String>,
    /// Run in the background
    pub detach: bool,
    /// Let the engine delete the workload once it stops
    pub auto_remove: bool,
}

impl LaunchSpec {
    /// Engine labels for this launch.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.route.labels()
    }
}

/// Engine-side lifecycle state of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadState {
    /// Created but not started.
    Created,
    /// Running.
    Running,
    /// Frozen by the engine; resumable.
    Paused,
    /// Exited or dead, not yet removed.
    Exited,
    /// Any other engine-reported state.
    Unknown(String),
}

impl WorkloadState {
    /// Parse an engine status string.
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "created" => WorkloadState::Created,
            "running" | "restarting" => WorkloadState::Running,
            "paused" => WorkloadState::Paused,
            "exited" | "dead" | "removing" => WorkloadState::Exited,
            other => WorkloadState::Unknown(other.to_string()),
        }
    }

    /// Whether the workload has terminated. `Unknown` states are not gone.
    pub fn is_gone(&self) -> bool {
        matches!(self, WorkloadState::Exited)
    }
}

/// Handle to a workload known to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadHandle {
    /// Engine-assigned id
    pub id: String,
    /// Container name
    pub name: String,
    /// State at the time the handle was obtained
    pub state: WorkloadState,
}

impl WorkloadHandle {
    /// Abbreviated id for display.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

/// Trait for workload engines.
///
/// Launchers are PURE engine adapters - they know nothing about sessions or
/// the registry. Classification into session-level errors is the caller's job.
#[async_trait]
pub trait WorkloadLauncher: Send + Sync {
    /// Launcher type identifier (e.g., "docker", "mock")
    fn launcher_type(&self) -> &'static str;

    /// Check the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Create and start a workload.
    async fn launch(&self, spec: &LaunchSpec) -> Result<WorkloadHandle>;

    /// Look up a workload by name or id.
    async fn inspect(&self, name_or_id: &str) -> Result<WorkloadHandle>;

    /// Stop a workload, waiting at most `timeout` before the engine kills it.
    async fn stop(&self, handle: &WorkloadHandle, timeout: Duration) -> Result<()>;

    /// Remove a workload. Callers treat failures as best effort.
    async fn remove(&self, handle: &WorkloadHandle, force: bool) -> Result<()>;
}
