// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Front-end request handlers.
//!
//! Transport-independent: each handler translates one user action into a
//! lifecycle-manager call and shapes the result for display.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::manager::{SessionManager, SessionView, StopOutcome};
use crate::registry::{SessionId, SessionStatus};

/// Shared state for front-end handlers.
pub struct ControllerState {
    /// The lifecycle manager.
    pub manager: Arc<SessionManager>,
    /// Public base URL of the reverse proxy, without trailing slash.
    pub proxy_base_url: String,
    /// When the server started (for uptime calculation).
    pub start_time: Instant,
    /// Server version string.
    pub version: String,
}

impl ControllerState {
    /// Create a new handler state.
    pub fn new(manager: Arc<SessionManager>, proxy_base_url: impl Into<String>) -> Self {
        Self {
            manager,
            proxy_base_url: proxy_base_url.into().trim_end_matches('/').to_string(),
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get the server uptime in milliseconds.
    pub fn uptime_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }

    /// Public URL of a session UI.
    pub fn session_url(&self, view: &SessionView) -> String {
        format!("{}{}", self.proxy_base_url, view.path)
    }

    fn entry(&self, view: SessionView) -> SessionEntry {
        SessionEntry {
            url: self.session_url(&view),
            session_id: view.session_id,
            display_name: view.display_name,
            status: view.status,
            created_at: view.created_at,
        }
    }
}

// ============================================================================
// Health Check
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    /// Whether the workload engine answers.
    pub healthy: bool,
    /// Launcher type.
    pub launcher: &'static str,
    /// Server version.
    pub version: String,
    /// Server uptime in milliseconds.
    pub uptime_ms: i64,
    /// Number of registered sessions.
    pub sessions: usize,
}

/// Handle health check request.
pub async fn handle_health_check(state: &ControllerState) -> HealthCheckResponse {
    let healthy = state.manager.launcher().ping().await.is_ok();

    HealthCheckResponse {
        healthy,
        launcher: state.manager.launcher().launcher_type(),
        version: state.version.clone(),
        uptime_ms: state.uptime_ms(),
        sessions: state.manager.registry().len().await,
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// A session as shown to users.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    /// Session id.
    pub session_id: SessionId,
    /// Container name.
    pub display_name: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Public URL of the session UI.
    pub url: String,
}

/// Response from creating a session.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    /// New session id.
    pub session_id: SessionId,
    /// Session status.
    pub status: SessionStatus,
    /// Public URL of the session UI.
    pub url: String,
}

/// Handle create session request.
pub async fn handle_create_session(state: &ControllerState) -> Result<CreateSessionResponse> {
    let view = state.manager.create_session().await?;
    let url = state.session_url(&view);

    info!(session_id = %view.session_id, url = %url, "Session created");

    Ok(CreateSessionResponse {
        session_id: view.session_id,
        status: view.status,
        url,
    })
}

/// Response from stopping a session.
#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    /// Whether the workload was stopped by this request.
    pub ok: bool,
    /// What the stop did.
    pub outcome: StopOutcome,
    /// Warning text for no-op stops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Handle stop session request.
pub async fn handle_stop_session(
    state: &ControllerState,
    session_id: &SessionId,
) -> Result<StopSessionResponse> {
    let outcome = state.manager.stop_session(session_id).await?;

    let warning = match outcome {
        StopOutcome::Stopped => None,
        StopOutcome::AlreadyGone => Some(format!(
            "Container for session {session_id} already removed or not found."
        )),
        StopOutcome::NotRegistered => Some(format!("Session ID {session_id} not found.")),
    };

    Ok(StopSessionResponse {
        ok: !outcome.is_warning(),
        outcome,
        warning,
    })
}

/// Handle get session request.
pub async fn handle_get_session(
    state: &ControllerState,
    session_id: &SessionId,
) -> Result<SessionEntry> {
    let view = state.manager.get_session(session_id).await?;
    Ok(state.entry(view))
}

/// Handle list sessions request.
pub async fn handle_list_sessions(state: &ControllerState) -> Vec<SessionEntry> {
    state
        .manager
        .list_sessions()
        .await
        .into_iter()
        .map(|view| state.entry(view))
        .collect()
}

/// Handle recent events request.
pub async fn handle_recent_events(state: &ControllerState) -> Vec<String> {
    state.manager.recent_events().await
}
