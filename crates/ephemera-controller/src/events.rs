// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded status log of lifecycle events, newest first.
//!
//! Each appended event is also emitted through `tracing` at the matching level.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Severity of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    /// Normal progress.
    Info,
    /// Benign anomaly (already stopped, unknown session).
    Warning,
    /// Failed operation.
    Error,
}

/// One lifecycle event.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    /// When the event was recorded
    pub at: DateTime<Utc>,
    /// Severity
    pub level: EventLevel,
    /// Human-readable message
    pub message: String,
}

impl SessionEvent {
    /// Render for display: `[HH:MM:SS] message`, with a severity prefix.
    pub fn render(&self) -> String {
        let prefix = match self.level {
            EventLevel::Info => "",
            EventLevel::Warning => "Warning: ",
            EventLevel::Error => "ERROR: ",
        };
        format!("[{}] {}{}", self.at.format("%H:%M:%S"), prefix, self.message)
    }
}

/// Bounded, ordered event log.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    events: Mutex<VecDeque<SessionEvent>>,
}

impl EventLog {
    /// Create a log that keeps at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of retained events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest when full.
    pub async fn push(&self, level: EventLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            EventLevel::Info => info!("{}", message),
            EventLevel::Warning => warn!("{}", message),
            EventLevel::Error => error!("{}", message),
        }

        let mut events = self.events.lock().await;
        events.push_front(SessionEvent {
            at: Utc::now(),
            level,
            message,
        });
        events.truncate(self.capacity);
    }

    /// Append an info event.
    pub async fn info(&self, message: impl Into<String>) {
        self.push(EventLevel::Info, message).await;
    }

    /// Append a warning event.
    pub async fn warning(&self, message: impl Into<String>) {
        self.push(EventLevel::Warning, message).await;
    }

    /// Append an error event.
    pub async fn error(&self, message: impl Into<String>) {
        self.push(EventLevel::Error, message).await;
    }

    /// Snapshot of retained events, newest first.
    pub async fn snapshot(&self) -> Vec<SessionEvent> {
        self.events.lock().await.iter().cloned().collect()
    }

    /// Rendered events, newest first.
    pub async fn recent(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(SessionEvent::render)
            .collect()
    }
}
