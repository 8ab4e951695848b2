// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session Registry
//!
//! Authoritative in-memory map from session id to session record. A session
//! exists exactly when the registry holds it, whatever the engine reports.
//!
//! Every call takes the registry lock once, mutates or copies, and releases it.
//! Readers only ever receive clones.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Short opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Length of generated ids.
    pub const LEN: usize = 8;

    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id from a v4 UUID.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(uuid[..Self::LEN].to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Identity assigned, workload not launched yet.
    Pending,
    /// Workload launched and registered.
    Running,
    /// Removed from the registry, workload stop in flight.
    Stopping,
    /// Workload stopped or already gone.
    Stopped,
}

impl SessionStatus {
    /// Get the status string
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Stopping => "stopping",
            SessionStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id (immutable once assigned)
    pub session_id: SessionId,
    /// Engine-assigned workload id, absent until launch succeeds
    pub workload_id: Option<String>,
    /// Deterministic container name derived from the session id
    pub workload_name: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// New pending record for a session.
    pub fn pending(session_id: SessionId, workload_name: impl Into<String>) -> Self {
        Self {
            session_id,
            workload_id: None,
            workload_name: workload_name.into(),
            status: SessionStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Workload reference for engine calls: id when known, name otherwise.
    pub fn workload_ref(&self) -> &str {
        self.workload_id.as_deref().unwrap_or(&self.workload_name)
    }
}

/// In-memory session registry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<IndexMap<SessionId, SessionRecord>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Fails if the id is already present; never overwrites.
    pub async fn create(&self, session_id: SessionId, record: SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session_id) {
            return Err(Error::DuplicateSession(session_id));
        }

        tracing::debug!(
            session_id = %session_id,
            workload_name = %record.workload_name,
            "Registered session"
        );
        sessions.insert(session_id, record);
        Ok(())
    }

    /// Snapshot of one record.
    pub async fn get(&self, session_id: &SessionId) -> Result<SessionRecord> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.clone()))
    }

    /// Remove a record and return it. Remaining records keep their order.
    pub async fn remove(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let removed = self.sessions.lock().await.shift_remove(session_id);
        match removed {
            Some(record) => {
                tracing::debug!(session_id = %session_id, "Unregistered session");
                Ok(record)
            }
            None => Err(Error::SessionNotFound(session_id.clone())),
        }
    }

    /// Snapshot of all records in insertion order.
    pub async fn list(&self) -> Vec<SessionRecord> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Whether a session id is registered.
    pub async fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(id: &str) -> SessionRecord {
        let mut r = SessionRecord::pending(SessionId::new(id), format!("firefox-session-{id}"));
        r.status = SessionStatus::Running;
        r.workload_id = Some(format!("wl-{id}"));
        r
    }

    #[test]
    fn test_generated_ids_are_short_hex() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), SessionId::LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_workload_ref_prefers_id() {
        let mut r = record("abc");
        assert_eq!(r.workload_ref(), "wl-abc");
        r.workload_id = None;
        assert_eq!(r.workload_ref(), "firefox-session-abc");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let registry = SessionRegistry::new();
        registry.create("a".into(), record("a")).await.unwrap();

        let mut other = record("a");
        other.workload_name = "something-else".to_string();
        let err = registry.create("a".into(), other).await.unwrap_err();

        assert!(matches!(err, Error::DuplicateSession(id) if id.as_str() == "a"));
        let kept = registry.get(&"a".into()).await.unwrap();
        assert_eq!(kept.workload_name, "firefox-session-a");
    }

    #[tokio::test]
    async fn test_get_and_remove_missing() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.get(&"nope".into()).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.remove(&"nope".into()).await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order_after_remove() {
        let registry = SessionRegistry::new();
        for id in ["c", "a", "b", "d"] {
            registry.create(id.into(), record(id)).await.unwrap();
        }

        let removed = registry.remove(&"a".into()).await.unwrap();
        assert_eq!(removed.session_id.as_str(), "a");

        let ids: Vec<_> = registry
            .list()
            .await
            .into_iter()
            .map(|r| r.session_id.to_string())
            .collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_creates_with_same_id_admit_one() {
        let registry = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.create("same".into(), record("same")).await.is_ok()
            }));
        }

        let results = futures::future::join_all(tasks).await;
        let admitted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_removes_return_record_once() {
        let registry = Arc::new(SessionRegistry::new());
        registry.create("x".into(), record("x")).await.unwrap();

        let a = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.remove(&"x".into()).await.is_ok() })
        };
        let b = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.remove(&"x".into()).await.is_ok() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b);
        assert!(registry.is_empty().await);
    }
}
