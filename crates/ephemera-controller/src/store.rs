// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Optional durable storage for the session registry.
//!
//! The registry stays the source of truth while the controller runs. A store
//! only receives snapshots so that a restarted controller can re-adopt
//! workloads that are still running.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::SessionRecord;

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Pluggable session persistence backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store type identifier (e.g., "json-file")
    fn store_type(&self) -> &'static str;

    /// Load the last saved snapshot. An absent snapshot is empty.
    async fn load(&self) -> Result<Vec<SessionRecord>>;

    /// Replace the stored snapshot.
    async fn save(&self, records: &[SessionRecord]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    sessions: Vec<SessionRecord>,
}

/// Snapshot store backed by a single JSON file.
///
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "sessions.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    fn store_type(&self) -> &'static str {
        "json-file"
    }

    async fn load(&self) -> Result<Vec<SessionRecord>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Store(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                self.path.display()
            )));
        }
        Ok(snapshot.sessions)
    }

    async fn save(&self, records: &[SessionRecord]) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            sessions: records.to_vec(),
        };
        let data = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, data).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            sessions = records.len(),
            "Saved session snapshot"
        );
        Ok(())
    }
}
