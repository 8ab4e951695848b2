// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session lifecycle manager.
//!
//! Orchestrates the create and stop protocols on top of the registry, the
//! route generator and a [`WorkloadLauncher`].
//!
//! # Session State Machine
//!
//! ```text
//!   ┌─────────┐  launch ok + insert   ┌─────────┐  registry remove  ┌──────────┐
//!   │ PENDING │──────────────────────►│ RUNNING │──────────────────►│ STOPPING │──► (gone)
//!   └────┬────┘                       └─────────┘                   └──────────┘
//!        │ launch failed
//!        ▼
//!   cleanup by name, never registered
//! ```
//!
//! # Create (two-phase)
//!
//! The engine call runs outside the registry lock; the record is inserted only
//! after the launch succeeded. A failed launch triggers a best-effort
//! `inspect` + forced `remove` of the deterministic container name, since the
//! engine may have created the container before failing.
//!
//! # Stop (registry first)
//!
//! The record is removed from the registry before the engine is asked to stop
//! the workload. A concurrent second stop sees no record and reports a
//! warning. A failed engine stop does not re-insert the record.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::events::EventLog;
use crate::launcher::{
    LaunchSpec, LauncherError, WorkloadHandle, WorkloadLauncher, WorkloadState,
};
use crate::registry::{SessionId, SessionRecord, SessionRegistry, SessionStatus};
use crate::routing::RouteDescriptor;
use crate::store::SessionStore;

/// Attempts at finding an unused session id before giving up.
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Session id source. Defaults to [`SessionId::generate`].
pub type IdGenerator = Arc<dyn Fn() -> SessionId + Send + Sync>;

/// Read-only view of a session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    /// Session id
    pub session_id: SessionId,
    /// Container name shown to users
    pub display_name: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Proxy path of the session UI, `/session/{id}/`
    pub path: String,
}

impl From<&SessionRecord> for SessionView {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            display_name: record.workload_name.clone(),
            status: record.status,
            created_at: record.created_at,
            path: format!("/session/{}/", record.session_id),
        }
    }
}

/// What a stop request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// The workload was stopped.
    Stopped,
    /// The session was registered but its workload was already gone.
    AlreadyGone,
    /// No such session; nothing was done.
    NotRegistered,
}

impl StopOutcome {
    /// Whether the outcome should be reported as a warning.
    pub fn is_warning(&self) -> bool {
        !matches!(self, StopOutcome::Stopped)
    }
}

/// Session ids with a launch in flight. Two concurrent creates never launch
/// under the same id.
#[derive(Default)]
struct InFlight(StdMutex<HashSet<SessionId>>);

impl InFlight {
    fn claim(&self, id: &SessionId) -> Option<LaunchClaim<'_>> {
        let mut ids = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id.clone()) {
            return None;
        }
        Some(LaunchClaim {
            in_flight: self,
            id: id.clone(),
        })
    }
}

struct LaunchClaim<'a> {
    in_flight: &'a InFlight,
    id: SessionId,
}

impl Drop for LaunchClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// The session lifecycle manager.
pub struct SessionManager {
    config: ManagerConfig,
    launcher: Arc<dyn WorkloadLauncher>,
    registry: Arc<SessionRegistry>,
    events: Arc<EventLog>,
    store: Option<Arc<dyn SessionStore>>,
    persist_lock: Mutex<()>,
    in_flight: InFlight,
    id_generator: IdGenerator,
}

impl SessionManager {
    /// Create a manager with an empty registry and event log.
    pub fn new(config: ManagerConfig, launcher: Arc<dyn WorkloadLauncher>) -> Self {
        let events = Arc::new(EventLog::new(config.event_log_capacity));
        Self {
            config,
            launcher,
            registry: Arc::new(SessionRegistry::new()),
            events,
            store: None,
            persist_lock: Mutex::new(()),
            in_flight: InFlight::default(),
            id_generator: Arc::new(SessionId::generate),
        }
    }

    /// Use an existing registry.
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Persist registry snapshots to `store` after every change.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the session id generator.
    pub fn with_id_generator(
        mut self,
        generator: impl Fn() -> SessionId + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    /// Manager settings.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The status log.
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// The workload launcher.
    pub fn launcher(&self) -> &Arc<dyn WorkloadLauncher> {
        &self.launcher
    }

    /// Deterministic container name for a session.
    pub fn container_name(&self, session_id: &SessionId) -> String {
        format!("{}-{}", self.config.container_prefix, session_id)
    }

    /// Proxy route for a session.
    pub fn route(&self, session_id: &SessionId) -> RouteDescriptor {
        RouteDescriptor::generate(
            session_id,
            self.config.internal_port,
            &self.config.entrypoint,
        )
    }

    /// Launch spec for a session.
    pub fn launch_spec(&self, session_id: &SessionId) -> LaunchSpec {
        LaunchSpec {
            image: self.config.image.clone(),
            container_name: self.container_name(session_id),
            route: self.route(session_id),
            network: self.config.network.clone(),
            env: self.config.env.clone(),
            detach: true,
            auto_remove: true,
        }
    }

    /// Check that the engine is reachable.
    pub async fn probe_engine(&self) -> Result<()> {
        match self.launcher.ping().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = engine_message(e);
                self.events
                    .error(format!("Workload engine not available: {message}"))
                    .await;
                Err(Error::EngineUnavailable(message))
            }
        }
    }

    /// Create a new session: launch its workload, then register it.
    pub async fn create_session(&self) -> Result<SessionView> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let session_id = (self.id_generator)();

            let claim = if self.registry.contains(&session_id).await {
                None
            } else {
                self.in_flight.claim(&session_id)
            };
            let Some(_claim) = claim else {
                debug!(session_id = %session_id, attempts, "Session id already taken");
                if attempts >= MAX_ID_ATTEMPTS {
                    self.events
                        .error(format!(
                            "Could not allocate a unique session id after {attempts} attempts"
                        ))
                        .await;
                    return Err(Error::DuplicateSession(session_id));
                }
                continue;
            };

            let spec = self.launch_spec(&session_id);
            let container_name = spec.container_name.clone();
            let mut record = SessionRecord::pending(session_id.clone(), &container_name);

            self.events
                .info(format!(
                    "Attempting to launch container '{container_name}' for session {session_id}"
                ))
                .await;

            let handle = match self.launcher.launch(&spec).await {
                Ok(handle) => handle,
                Err(e) => return Err(self.handle_launch_failure(&container_name, e).await),
            };

            record.workload_id = Some(handle.id.clone());
            record.status = SessionStatus::Running;

            match self.registry.create(session_id.clone(), record.clone()).await {
                Ok(()) => {}
                Err(Error::DuplicateSession(id)) => {
                    warn!(
                        session_id = %id,
                        container_name = %container_name,
                        "Session id registered while launching, discarding workload"
                    );
                    self.discard_workload(&handle).await;
                    if attempts >= MAX_ID_ATTEMPTS {
                        return Err(Error::DuplicateSession(id));
                    }
                    continue;
                }
                Err(e) => {
                    self.discard_workload(&handle).await;
                    return Err(e);
                }
            }

            self.events
                .info(format!(
                    "Launched container {} ('{}') for session {}",
                    handle.short_id(),
                    container_name,
                    session_id
                ))
                .await;
            self.persist().await;

            return Ok(SessionView::from(&record));
        }
    }

    /// Stop a session. The registry entry is removed before the engine is called.
    pub async fn stop_session(&self, session_id: &SessionId) -> Result<StopOutcome> {
        let mut record = match self.registry.remove(session_id).await {
            Ok(record) => record,
            Err(Error::SessionNotFound(_)) => {
                self.events
                    .warning(format!("Session ID {session_id} not found. Cannot stop."))
                    .await;
                return Ok(StopOutcome::NotRegistered);
            }
            Err(e) => return Err(e),
        };
        record.status = SessionStatus::Stopping;
        self.persist().await;

        let name = record.workload_name.clone();
        self.events
            .info(format!(
                "Attempting to stop container {} ('{}') for session {}",
                short(record.workload_ref()),
                name,
                session_id
            ))
            .await;

        let result = match self.launcher.inspect(record.workload_ref()).await {
            Ok(handle) => self.launcher.stop(&handle, self.config.stop_grace).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                record.status = SessionStatus::Stopped;
                info!(session_id = %session_id, status = %record.status, "Session stopped");
                self.events
                    .info(format!("Stopped container '{name}'"))
                    .await;
                Ok(StopOutcome::Stopped)
            }
            Err(LauncherError::NotFound(_)) => {
                self.events
                    .warning(format!("Container '{name}' already removed or not found."))
                    .await;
                Ok(StopOutcome::AlreadyGone)
            }
            Err(LauncherError::Unavailable(message)) => {
                self.events
                    .error(format!(
                        "Cannot stop container '{name}', workload engine not available: {message}"
                    ))
                    .await;
                Err(Error::EngineUnavailable(message))
            }
            Err(e) => {
                let message = engine_message(e);
                self.events
                    .error(format!("Failed to stop container '{name}': {message}"))
                    .await;
                Err(Error::Stop {
                    container_name: name,
                    message,
                })
            }
        }
    }

    /// View of one session.
    pub async fn get_session(&self, session_id: &SessionId) -> Result<SessionView> {
        let record = self.registry.get(session_id).await?;
        Ok(SessionView::from(&record))
    }

    /// Views of all sessions in creation order.
    pub async fn list_sessions(&self) -> Vec<SessionView> {
        self.registry
            .list()
            .await
            .iter()
            .map(SessionView::from)
            .collect()
    }

    /// Rendered status log, newest first.
    pub async fn recent_events(&self) -> Vec<String> {
        self.events.recent().await
    }

    /// Drop sessions whose workload has disappeared or exited.
    ///
    /// Workloads in a state the engine adapter does not recognise are kept.
    ///
    /// Returns the number of sessions removed.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut dropped = 0;

        for record in self.registry.list().await {
            let exited = match self.launcher.inspect(record.workload_ref()).await {
                Ok(handle) if handle.state.is_gone() => Some(handle),
                Ok(handle) => {
                    if let WorkloadState::Unknown(state) = &handle.state {
                        warn!(
                            session_id = %record.session_id,
                            state = %state,
                            "Workload in unrecognised state, keeping session"
                        );
                    }
                    continue;
                }
                Err(LauncherError::NotFound(_)) => None,
                Err(LauncherError::Unavailable(message)) => {
                    return Err(Error::EngineUnavailable(message));
                }
                Err(e) => {
                    warn!(
                        session_id = %record.session_id,
                        error = %e,
                        "Failed to inspect session workload"
                    );
                    continue;
                }
            };

            // A concurrent stop may have won; only the remover reports.
            if self.registry.remove(&record.session_id).await.is_err() {
                continue;
            }
            dropped += 1;

            if let Some(handle) = exited {
                self.discard_workload(&handle).await;
            }
            self.events
                .warning(format!(
                    "Container '{}' for session {} is gone, session removed.",
                    record.workload_name, record.session_id
                ))
                .await;
        }

        if dropped > 0 {
            self.persist().await;
        }
        Ok(dropped)
    }

    /// Re-adopt sessions from a previous run whose workloads have not exited.
    ///
    /// Returns the number of sessions restored.
    pub async fn restore(&self, records: Vec<SessionRecord>) -> Result<usize> {
        let mut restored = 0;

        for mut record in records {
            let handle = match self.launcher.inspect(record.workload_ref()).await {
                Ok(handle) if !handle.state.is_gone() => {
                    if let WorkloadState::Unknown(state) = &handle.state {
                        warn!(
                            session_id = %record.session_id,
                            state = %state,
                            "Restoring session with workload in unrecognised state"
                        );
                    }
                    handle
                }
                Ok(_) | Err(LauncherError::NotFound(_)) => {
                    self.events
                        .warning(format!(
                            "Container '{}' for session {} no longer running, not restored.",
                            record.workload_name, record.session_id
                        ))
                        .await;
                    continue;
                }
                Err(LauncherError::Unavailable(message)) => {
                    return Err(Error::EngineUnavailable(message));
                }
                Err(e) => {
                    warn!(
                        session_id = %record.session_id,
                        error = %e,
                        "Failed to inspect workload of stored session"
                    );
                    continue;
                }
            };

            record.workload_id = Some(handle.id);
            record.status = SessionStatus::Running;
            match self.registry.create(record.session_id.clone(), record).await {
                Ok(()) => restored += 1,
                Err(Error::DuplicateSession(id)) => {
                    warn!(session_id = %id, "Stored session already registered");
                }
                Err(e) => return Err(e),
            }
        }

        if restored > 0 {
            self.events
                .info(format!("Restored {restored} session(s) from previous run"))
                .await;
        }
        self.persist().await;
        Ok(restored)
    }

    /// Stop every registered session. Returns how many ended cleanly.
    pub async fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for record in self.registry.list().await {
            match self.stop_session(&record.session_id).await {
                Ok(StopOutcome::Stopped) | Ok(StopOutcome::AlreadyGone) => stopped += 1,
                Ok(StopOutcome::NotRegistered) => {}
                Err(e) => warn!(session_id = %record.session_id, error = %e, "Failed to stop session"),
            }
        }
        stopped
    }

    /// Classify a launch failure, record it and clean up a half-created workload.
    async fn handle_launch_failure(&self, container_name: &str, error: LauncherError) -> Error {
        let message = match error {
            LauncherError::Unavailable(message) => {
                self.events
                    .error(format!(
                        "Cannot launch container '{container_name}', workload engine not available: {message}"
                    ))
                    .await;
                return Error::EngineUnavailable(message);
            }
            other => engine_message(other),
        };
        self.events
            .error(format!(
                "Failed to launch container '{container_name}': {message}"
            ))
            .await;
        self.cleanup_failed_launch(container_name).await;

        Error::Launch {
            container_name: container_name.to_string(),
            message,
        }
    }

    /// Best-effort removal of a container a failed launch may have left behind.
    async fn cleanup_failed_launch(&self, container_name: &str) {
        let handle = match self.launcher.inspect(container_name).await {
            Ok(handle) => handle,
            Err(LauncherError::NotFound(_)) => {
                debug!(container_name = %container_name, "Nothing to clean up after failed launch");
                return;
            }
            Err(e) => {
                self.events
                    .error(format!(
                        "Cleanup of failed container '{container_name}' failed: {e}"
                    ))
                    .await;
                return;
            }
        };

        match self.launcher.remove(&handle, true).await {
            Ok(()) | Err(LauncherError::NotFound(_)) => {
                self.events
                    .info(format!(
                        "Cleaned up potentially failed container '{container_name}'"
                    ))
                    .await;
            }
            Err(e) => {
                self.events
                    .error(format!(
                        "Cleanup of failed container '{container_name}' failed: {e}"
                    ))
                    .await;
            }
        }
    }

    /// Best-effort forced removal of a workload we will not register.
    async fn discard_workload(&self, handle: &WorkloadHandle) {
        if let Err(e) = self.launcher.remove(handle, true).await {
            warn!(
                container_name = %handle.name,
                error = %e,
                "Failed to remove discarded workload"
            );
        }
    }

    /// Write the current registry snapshot to the store, if one is configured.
    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let _guard = self.persist_lock.lock().await;
        let records = self.registry.list().await;
        if let Err(e) = store.save(&records).await {
            warn!(store = store.store_type(), error = %e, "Failed to persist sessions");
        }
    }
}

/// Engine message without the launcher's own prefix.
fn engine_message(error: LauncherError) -> String {
    match error {
        LauncherError::Launch(m)
        | LauncherError::Stop(m)
        | LauncherError::Remove(m)
        | LauncherError::Unavailable(m)
        | LauncherError::Other(m) => m,
        other => other.to_string(),
    }
}

/// Abbreviated workload id for display.
fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{LauncherCall, MockLauncher};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(launcher: Arc<MockLauncher>) -> SessionManager {
        SessionManager::new(ManagerConfig::default(), launcher)
    }

    #[test]
    fn test_launch_spec_embeds_route_and_env() {
        let m = manager(Arc::new(MockLauncher::new()));
        let spec = m.launch_spec(&SessionId::new("ab12cd34"));

        assert_eq!(spec.container_name, "firefox-session-ab12cd34");
        assert_eq!(spec.image, "jlesage/firefox:latest");
        assert_eq!(spec.network, "proxy_network");
        assert_eq!(spec.route.backend_port, 5800);
        assert_eq!(spec.env["TZ"], "America/Toronto");
        assert!(spec.detach);
        assert!(spec.auto_remove);
    }

    #[test]
    fn test_stop_outcome_warning() {
        assert!(!StopOutcome::Stopped.is_warning());
        assert!(StopOutcome::AlreadyGone.is_warning());
        assert!(StopOutcome::NotRegistered.is_warning());
    }

    #[test]
    fn test_in_flight_claim_released_on_drop() {
        let in_flight = InFlight::default();
        let id = SessionId::new("x");
        {
            let _claim = in_flight.claim(&id).unwrap();
            assert!(in_flight.claim(&id).is_none());
        }
        assert!(in_flight.claim(&id).is_some());
    }

    #[tokio::test]
    async fn test_registry_collision_regenerates_id() {
        let launcher = Arc::new(MockLauncher::new());
        let ids = ["dup00000", "dup00000", "fresh111"];
        let next = Arc::new(AtomicUsize::new(0));
        let m = manager(launcher.clone()).with_id_generator(move || {
            SessionId::new(ids[next.fetch_add(1, Ordering::SeqCst).min(ids.len() - 1)])
        });

        let first = m.create_session().await.unwrap();
        let second = m.create_session().await.unwrap();

        assert_eq!(first.session_id.as_str(), "dup00000");
        assert_eq!(second.session_id.as_str(), "fresh111");
        assert_eq!(m.registry().len().await, 2);

        let launches = launcher
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, LauncherCall::Launch(_)))
            .count();
        assert_eq!(launches, 2);
    }

    #[tokio::test]
    async fn test_exhausted_id_attempts_report_duplicate() {
        let launcher = Arc::new(MockLauncher::new());
        let m = manager(launcher).with_id_generator(|| SessionId::new("same0000"));

        m.create_session().await.unwrap();
        let err = m.create_session().await.unwrap_err();

        assert!(matches!(err, Error::DuplicateSession(_)));
        assert_eq!(m.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_unavailable_engine_on_create_skips_cleanup() {
        let launcher = Arc::new(MockLauncher::unavailable());
        let m = manager(launcher.clone());

        let err = m.create_session().await.unwrap_err();

        assert!(matches!(err, Error::EngineUnavailable(_)));
        assert!(m.registry().is_empty().await);
        let calls = launcher.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], LauncherCall::Launch(_)));
    }

    #[tokio::test]
    async fn test_engine_reachability_check() {
        let m = manager(Arc::new(MockLauncher::new()));
        assert!(m.probe_engine().await.is_ok());

        let m = manager(Arc::new(MockLauncher::unavailable()));
        assert!(matches!(
            m.probe_engine().await,
            Err(Error::EngineUnavailable(_))
        ));
        assert!(m.recent_events().await[0].contains("not available"));
    }
}
