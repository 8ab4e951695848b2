// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock launcher for testing.
//!
//! Keeps workloads in memory, records every call, and can be told to fail in
//! the ways a real engine does.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;

use super::traits::*;

/// A call made against the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherCall {
    /// `ping`
    Ping,
    /// `launch` with the container name
    Launch(String),
    /// `inspect` with the requested name or id
    Inspect(String),
    /// `stop` with the workload name
    Stop(String),
    /// `remove` with the workload name and force flag
    Remove {
        /// Workload name
        name: String,
        /// Force flag
        force: bool,
    },
}

#[derive(Debug, Clone)]
struct MockWorkload {
    handle: WorkloadHandle,
    labels: BTreeMap<String, String>,
    auto_remove: bool,
}

/// Mock launcher for testing.
pub struct MockLauncher {
    workloads: Arc<Mutex<IndexMap<String, MockWorkload>>>,
    calls: Arc<Mutex<Vec<LauncherCall>>>,
    next_id: AtomicU64,
    fail_launch: AtomicBool,
    fail_launch_after_create: AtomicBool,
    fail_stop: AtomicBool,
    fail_remove: AtomicBool,
    unavailable: AtomicBool,
    /// Optional delay to simulate slow launches (in milliseconds)
    pub launch_delay_ms: u64,
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLauncher {
    /// Create a new mock launcher.
    pub fn new() -> Self {
        Self {
            workloads: Arc::new(Mutex::new(IndexMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            fail_launch: AtomicBool::new(false),
            fail_launch_after_create: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            launch_delay_ms: 0,
        }
    }

    /// Create a mock launcher whose launches always fail before creating anything.
    pub fn failing() -> Self {
        let launcher = Self::new();
        launcher.set_fail_launch(true);
        launcher
    }

    /// Create a mock launcher whose engine cannot be reached.
    pub fn unavailable() -> Self {
        let launcher = Self::new();
        launcher.set_unavailable(true);
        launcher
    }

    /// Fail launches before anything is created.
    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Fail launches after the workload was created (partial failure).
    pub fn set_fail_launch_after_create(&self, fail: bool) {
        self.fail_launch_after_create.store(fail, Ordering::SeqCst);
    }

    /// Fail stops of existing workloads.
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Fail removes of existing workloads.
    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Make every call report the engine as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All calls made so far.
    pub async fn calls(&self) -> Vec<LauncherCall> {
        self.calls.lock().await.clone()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    /// Handles of all workloads the engine currently holds.
    pub async fn workloads(&self) -> Vec<WorkloadHandle> {
        self.workloads
            .lock()
            .await
            .values()
            .map(|w| w.handle.clone())
            .collect()
    }

    /// Workloads carrying `key=value` among their labels.
    pub async fn workloads_with_label(&self, key: &str, value: &str) -> Vec<WorkloadHandle> {
        self.workloads
            .lock()
            .await
            .values()
            .filter(|w| w.labels.get(key).map(String::as_str) == Some(value))
            .map(|w| w.handle.clone())
            .collect()
    }

    /// Labels of a workload by name.
    pub async fn labels_of(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.workloads
            .lock()
            .await
            .get(name)
            .map(|w| w.labels.clone())
    }

    /// Drop a workload as if the engine auto-removed it.
    pub async fn vanish(&self, name: &str) {
        self.workloads.lock().await.shift_remove(name);
    }

    /// Force the engine-reported state of a workload.
    pub async fn set_state(&self, name: &str, state: WorkloadState) {
        if let Some(w) = self.workloads.lock().await.get_mut(name) {
            w.handle.state = state;
        }
    }

    fn allocate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{n:064x}")
    }

    async fn record(&self, call: LauncherCall) {
        self.calls.lock().await.push(call);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LauncherError::Unavailable(
                "Cannot connect to the mock engine".to_string(),
            ));
        }
        Ok(())
    }
}

/// Find a workload key by name or id.
fn lookup<'a>(workloads: &'a IndexMap<String, MockWorkload>, name_or_id: &str) -> Option<&'a str> {
    workloads
        .iter()
        .find(|(name, w)| name.as_str() == name_or_id || w.handle.id == name_or_id)
        .map(|(name, _)| name.as_str())
}

#[async_trait]
impl WorkloadLauncher for MockLauncher {
    fn launcher_type(&self) -> &'static str {
        "mock"
    }

    async fn ping(&self) -> Result<()> {
        self.record(LauncherCall::Ping).await;
        self.check_available()
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<WorkloadHandle> {
        self.record(LauncherCall::Launch(spec.container_name.clone()))
            .await;
        self.check_available()?;

        if self.launch_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.launch_delay_ms)).await;
        }

        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(LauncherError::Launch(format!(
                "pull access denied for {}",
                spec.image
            )));
        }

        let mut workloads = self.workloads.lock().await;
        if workloads.contains_key(&spec.container_name) {
            return Err(LauncherError::Launch(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.container_name
            )));
        }

        let partial = self.fail_launch_after_create.load(Ordering::SeqCst);
        let handle = WorkloadHandle {
            id: self.allocate_id(),
            name: spec.container_name.clone(),
            state: if partial {
                WorkloadState::Created
            } else {
                WorkloadState::Running
            },
        };
        workloads.insert(
            spec.container_name.clone(),
            MockWorkload {
                handle: handle.clone(),
                labels: spec.labels(),
                auto_remove: spec.auto_remove,
            },
        );

        if partial {
            return Err(LauncherError::Launch(format!(
                "network {} not found",
                spec.network
            )));
        }
        Ok(handle)
    }

    async fn inspect(&self, name_or_id: &str) -> Result<WorkloadHandle> {
        self.record(LauncherCall::Inspect(name_or_id.to_string()))
            .await;
        self.check_available()?;

        let workloads = self.workloads.lock().await;
        lookup(&workloads, name_or_id)
            .and_then(|name| workloads.get(name))
            .map(|w| w.handle.clone())
            .ok_or_else(|| LauncherError::NotFound(name_or_id.to_string()))
    }

    async fn stop(&self, handle: &WorkloadHandle, _timeout: Duration) -> Result<()> {
        self.record(LauncherCall::Stop(handle.name.clone())).await;
        self.check_available()?;

        let mut workloads = self.workloads.lock().await;
        let name = lookup(&workloads, &handle.id)
            .or_else(|| lookup(&workloads, &handle.name))
            .map(str::to_string)
            .ok_or_else(|| LauncherError::NotFound(handle.name.clone()))?;

        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(LauncherError::Stop(format!(
                "cannot stop container {}: permission denied",
                handle.name
            )));
        }

        let auto_remove = workloads.get(&name).map(|w| w.auto_remove).unwrap_or(false);
        if auto_remove {
            workloads.shift_remove(&name);
        } else if let Some(w) = workloads.get_mut(&name) {
            w.handle.state = WorkloadState::Exited;
        }
        Ok(())
    }

    async fn remove(&self, handle: &WorkloadHandle, force: bool) -> Result<()> {
        self.record(LauncherCall::Remove {
            name: handle.name.clone(),
            force,
        })
        .await;
        self.check_available()?;

        let mut workloads = self.workloads.lock().await;
        let name = lookup(&workloads, &handle.id)
            .or_else(|| lookup(&workloads, &handle.name))
            .map(str::to_string)
            .ok_or_else(|| LauncherError::NotFound(handle.name.clone()))?;

        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(LauncherError::Remove(format!(
                "removal of container {} is already in progress",
                handle.name
            )));
        }
        let running = workloads
            .get(&name)
            .map(|w| w.handle.state == WorkloadState::Running)
            .unwrap_or(false);
        if running && !force {
            return Err(LauncherError::Remove(format!(
                "cannot remove running container {}",
                handle.name
            )));
        }

        workloads.shift_remove(&name);
        Ok(())
    }
}
