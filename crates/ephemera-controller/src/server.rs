// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server for the controller front end.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/health` | [`handle_health_check`] |
//! | `GET` | `/api/sessions` | [`handle_list_sessions`] |
//! | `POST` | `/api/sessions` | [`handle_create_session`] |
//! | `GET` | `/api/sessions/{id}` | [`handle_get_session`] |
//! | `DELETE` | `/api/sessions/{id}` | [`handle_stop_session`] |
//! | `POST` | `/api/sessions/{id}/stop` | [`handle_stop_session`] |
//! | `GET` | `/api/events` | [`handle_recent_events`] |

use std::sync::Arc;

use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::Error;
use crate::handlers::{
    ControllerState, handle_create_session, handle_get_session, handle_health_check,
    handle_list_sessions, handle_recent_events, handle_stop_session,
};
use crate::registry::SessionId;

type SharedState = Arc<ControllerState>;

/// Build the front-end router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(stop_session))
        .route("/api/sessions/{id}/stop", post(stop_session))
        .route("/api/events", get(recent_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` turns true.
pub async fn run_server_with_shutdown(
    listener: TcpListener,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Error body returned to clients.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Launch { .. } => (StatusCode::BAD_GATEWAY, "launch_error"),
            Error::Stop { .. } => (StatusCode::BAD_GATEWAY, "stop_error"),
            Error::EngineUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "engine_unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(error = %self.0, code, "Request failed");
        }
        // Internal kinds (id exhaustion, store and I/O failures) stay in the log.
        let message = if code == "internal" {
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = serde_json::json!({ "code": code, "message": message });
        (status, Json(body)).into_response()
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(handle_health_check(&state).await)
}

async fn list_sessions(State(state): State<SharedState>) -> impl IntoResponse {
    Json(handle_list_sessions(&state).await)
}

async fn create_session(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let created = handle_create_session(&state).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let entry = handle_get_session(&state, &SessionId::new(id)).await?;
    Ok(Json(entry).into_response())
}

async fn stop_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let stopped = handle_stop_session(&state, &SessionId::new(id)).await?;
    Ok(Json(stopped).into_response())
}

async fn recent_events(State(state): State<SharedState>) -> impl IntoResponse {
    Json(handle_recent_events(&state).await)
}
