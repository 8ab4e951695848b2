// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for ephemera-controller tests.
//!
//! Provides TestContext wiring a mock launcher, a lifecycle manager and the
//! handler state together.

#![allow(dead_code)]

use std::sync::Arc;

use ephemera_controller::config::ManagerConfig;
use ephemera_controller::handlers::ControllerState;
use ephemera_controller::launcher::{LauncherCall, MockLauncher};
use ephemera_controller::manager::SessionManager;
use ephemera_controller::registry::SessionId;
use ephemera_controller::store::SessionStore;

/// Base URL used for session links in tests.
pub const TEST_BASE_URL: &str = "https://browsers.test";

/// Test context holding the mock engine and everything built on it.
pub struct TestContext {
    pub launcher: Arc<MockLauncher>,
    pub manager: Arc<SessionManager>,
    pub state: Arc<ControllerState>,
}

impl TestContext {
    /// Create a context with default manager settings.
    pub fn new() -> Self {
        Self::with_launcher(MockLauncher::new())
    }

    /// Create a context around a preconfigured mock launcher.
    pub fn with_launcher(launcher: MockLauncher) -> Self {
        let launcher = Arc::new(launcher);
        let manager = Arc::new(SessionManager::new(
            ManagerConfig::default(),
            launcher.clone(),
        ));
        Self::assemble(launcher, manager)
    }

    /// Create a context whose manager persists to `store`.
    pub fn with_store(store: Arc<dyn SessionStore>) -> Self {
        let launcher = Arc::new(MockLauncher::new());
        let manager = Arc::new(
            SessionManager::new(ManagerConfig::default(), launcher.clone()).with_store(store),
        );
        Self::assemble(launcher, manager)
    }

    /// Create a context whose manager hands out the same session id every time.
    pub fn with_fixed_id(id: &'static str) -> Self {
        let launcher = Arc::new(MockLauncher::new());
        let manager = Arc::new(
            SessionManager::new(ManagerConfig::default(), launcher.clone())
                .with_id_generator(move || SessionId::new(id)),
        );
        Self::assemble(launcher, manager)
    }

    fn assemble(launcher: Arc<MockLauncher>, manager: Arc<SessionManager>) -> Self {
        let state = Arc::new(ControllerState::new(manager.clone(), TEST_BASE_URL));
        Self {
            launcher,
            manager,
            state,
        }
    }

    /// Calls of one kind recorded by the mock, in order.
    pub async fn calls_matching(&self, f: impl Fn(&LauncherCall) -> bool) -> Vec<LauncherCall> {
        self.launcher
            .calls()
            .await
            .into_iter()
            .filter(|c| f(c))
            .collect()
    }
}
