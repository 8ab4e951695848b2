// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ephemera Controller - Ephemeral Browser Session Management
//!
//! This crate provides the control plane for on-demand, isolated browser
//! sessions. Each session is one short-lived container running a remote
//! browser UI, published through a shared reverse proxy under
//! `/session/{id}/` and torn down when the user asks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Browser / Front End                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ HTTP
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  ephemera-controller (This Crate)                        │
//! │                          Port 5000                                       │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │  Session    │  │  Lifecycle  │  │   Route     │  │  Workload   │     │
//! │  │  Registry   │  │  Manager    │  │  Generator  │  │  Launcher   │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                                             │ docker CLI
//!                                                             ▼
//! ┌──────────────────────┐  labels   ┌─────────────────────────────────────┐
//! │   Reverse Proxy      │◄──────────│   Session containers                │
//! │   (Traefik)          │──────────►│   firefox-session-{id}              │
//! └──────────────────────┘  /session └─────────────────────────────────────┘
//! ```
//!
//! # HTTP API
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Engine reachability, version, uptime |
//! | `GET` | `/api/sessions` | List sessions with their public URLs |
//! | `POST` | `/api/sessions` | Create a session |
//! | `GET` | `/api/sessions/{id}` | Get one session |
//! | `DELETE` | `/api/sessions/{id}` | Stop a session |
//! | `POST` | `/api/sessions/{id}/stop` | Stop a session (form-friendly) |
//! | `GET` | `/api/events` | Recent status messages, newest first |
//!
//! # Session Status
//!
//! ```text
//!   ┌─────────┐  launched   ┌─────────┐  stop   ┌──────────┐        ┌─────────┐
//!   │ PENDING │────────────►│ RUNNING │────────►│ STOPPING │───────►│ STOPPED │
//!   └─────────┘             └─────────┘         └──────────┘        └─────────┘
//! ```
//!
//! `Pending` and `Stopped` records are never visible in the registry: a
//! session is registered only once its workload exists and unregistered
//! before its workload is stopped.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EPHEMERA_HTTP_PORT` | `5000` | HTTP server port |
//! | `REVERSE_PROXY_BASE_URL` | `http://localhost` | Public base URL of the proxy |
//! | `EPHEMERA_IMAGE` | `jlesage/firefox:latest` | Browser image |
//! | `EPHEMERA_INTERNAL_PORT` | `5800` | Port the image serves its UI on |
//! | `EPHEMERA_NETWORK` | `proxy_network` | Network shared with the proxy |
//! | `EPHEMERA_ENTRYPOINT` | `web` | Proxy entrypoint for session routers |
//! | `EPHEMERA_CONTAINER_PREFIX` | `firefox-session` | Container name prefix |
//! | `EPHEMERA_TIMEZONE` | `America/Toronto` | `TZ` passed to workloads |
//! | `EPHEMERA_STOP_GRACE_SECONDS` | `5` | Stop grace period |
//! | `EPHEMERA_LAUNCH_TIMEOUT_SECONDS` | `120` | Upper bound on one launch |
//! | `EPHEMERA_EVENT_LOG_CAPACITY` | `10` | Status messages kept |
//! | `EPHEMERA_MONITOR_INTERVAL_SECONDS` | `30` | Monitor interval (`0` disables) |
//! | `EPHEMERA_STATE_FILE` | - | JSON snapshot for restart recovery |
//! | `EPHEMERA_STOP_ON_SHUTDOWN` | `false` | Stop all sessions on shutdown |
//! | `DOCKER_BIN` | `docker` | Docker CLI path |
//!
//! # Modules
//!
//! - [`config`]: Server configuration from environment variables
//! - [`error`]: Error types for controller operations
//! - [`events`]: Bounded status-message log
//! - [`handlers`]: Front-end request handlers
//! - [`launcher`]: Workload engine adapters (Docker, mock)
//! - [`manager`]: Session lifecycle orchestration
//! - [`monitor`]: Background reconciliation of vanished workloads
//! - [`registry`]: In-memory session registry
//! - [`routing`]: Reverse-proxy route labels per session
//! - [`runtime`]: Embeddable runtime wiring everything together
//! - [`server`]: HTTP server
//! - [`store`]: Session snapshots for restart recovery

#![deny(missing_docs)]

/// Server configuration loaded from environment variables.
pub mod config;

/// Error types for controller operations.
pub mod error;

/// Bounded log of user-facing status messages.
pub mod events;

/// Front-end request handlers.
pub mod handlers;

/// Workload engine adapters (Docker, mock).
pub mod launcher;

/// Session lifecycle orchestration.
pub mod manager;

/// Background worker for dropping sessions whose workload vanished.
pub mod monitor;

/// In-memory registry of live sessions.
pub mod registry;

/// Reverse-proxy route generation.
pub mod routing;

/// Embeddable runtime for the controller.
pub mod runtime;

/// HTTP server for the front-end API.
pub mod server;

/// Durable session snapshots.
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
