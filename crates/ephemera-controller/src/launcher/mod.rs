// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launcher module - workload engine adapters.

pub mod docker;
pub mod mock;
mod traits;

pub use docker::{DockerLauncher, DockerLauncherConfig};
pub use mock::{LauncherCall, MockLauncher};
pub use traits::*;
