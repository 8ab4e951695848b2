// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for ephemera-controller.
//!
//! Engine failures never leave the lifecycle manager as raw
//! [`LauncherError`](crate::launcher::LauncherError)s; every call site
//! classifies them into one of the session-level kinds below.

use thiserror::Error;

use crate::registry::SessionId;

/// Controller errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A session id collided with one already in the registry.
    #[error("Duplicate session: {0}")]
    DuplicateSession(SessionId),

    /// The engine failed to create the workload for a session.
    #[error("Failed to launch container '{container_name}': {message}")]
    Launch {
        /// Deterministic container name of the failed launch.
        container_name: String,
        /// Engine-provided failure description.
        message: String,
    },

    /// No session with this id is registered.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The engine failed to stop a known workload.
    #[error("Failed to stop container '{container_name}': {message}")]
    Stop {
        /// Container name of the session being stopped.
        container_name: String,
        /// Engine-provided failure description.
        message: String,
    },

    /// The workload engine itself cannot be reached.
    #[error("Workload engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Session store operation failed.
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type using controller Error.
pub type Result<T> = std::result::Result<T, Error>;
