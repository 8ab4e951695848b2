// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route descriptors for session workloads.
//!
//! Every session is reachable through the reverse proxy at
//! `/session/{session_id}`. The proxy discovers the route from labels on the
//! workload itself, so nothing here talks to the proxy directly:
//!
//! ```text
//!   browser ──► proxy :web ──► router  session-{id}   PathPrefix(`/session/{id}`)
//!                                │
//!                                ├─► middleware strip-session-{id}  (strip prefix)
//!                                ▼
//!                            service session-{id} ──► workload :{port}
//! ```
//!
//! Descriptors are derived, never stored. Router, service and middleware names
//! embed the session id so concurrently active sessions cannot collide.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::SessionId;

/// Label carrying the owning session id. Used to recognise our workloads.
pub const SESSION_LABEL: &str = "ephemera.session-id";

/// Proxy routing for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Session the route belongs to
    pub session_id: SessionId,
    /// Public path prefix, `/session/{id}`
    pub path_prefix: String,
    /// Port the workload serves on
    pub backend_port: u16,
    /// Proxy router name
    pub router_name: String,
    /// Proxy service name
    pub service_name: String,
    /// Prefix-stripping middleware name
    pub middleware_name: String,
    /// Proxy entrypoint the router binds to
    pub entrypoint: String,
}

impl RouteDescriptor {
    /// Derive the route for a session. Pure: same inputs, same descriptor.
    pub fn generate(session_id: &SessionId, backend_port: u16, entrypoint: &str) -> Self {
        let id = session_id.as_str();
        Self {
            session_id: session_id.clone(),
            path_prefix: format!("/session/{id}"),
            backend_port,
            router_name: format!("session-{id}"),
            service_name: format!("session-{id}"),
            middleware_name: format!("strip-session-{id}"),
            entrypoint: entrypoint.to_string(),
        }
    }

    /// Serialize to Traefik docker-provider labels.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let router = &self.router_name;
        let service = &self.service_name;
        let middleware = &self.middleware_name;

        let mut labels = BTreeMap::new();
        labels.insert("traefik.enable".to_string(), "true".to_string());
        labels.insert(
            format!("traefik.http.routers.{router}.rule"),
            format!("PathPrefix(`{}`)", self.path_prefix),
        );
        labels.insert(
            format!("traefik.http.routers.{router}.entrypoints"),
            self.entrypoint.clone(),
        );
        labels.insert(
            format!("traefik.http.routers.{router}.service"),
            service.clone(),
        );
        labels.insert(
            format!("traefik.http.routers.{router}.middlewares"),
            middleware.clone(),
        );
        labels.insert(
            format!("traefik.http.services.{service}.loadbalancer.server.port"),
            self.backend_port.to_string(),
        );
        labels.insert(
            format!("traefik.http.middlewares.{middleware}.stripprefix.prefixes"),
            self.path_prefix.clone(),
        );
        labels.insert(SESSION_LABEL.to_string(), self.session_id.to_string());
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::new(s)
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = RouteDescriptor::generate(&sid("ab12cd34"), 5800, "web");
        let b = RouteDescriptor::generate(&sid("ab12cd34"), 5800, "web");
        assert_eq!(a, b);
        assert_eq!(a.labels(), b.labels());
    }

    #[test]
    fn test_generate_names_embed_session_id() {
        let route = RouteDescriptor::generate(&sid("ab12cd34"), 5800, "web");
        assert_eq!(route.path_prefix, "/session/ab12cd34");
        assert_eq!(route.router_name, "session-ab12cd34");
        assert_eq!(route.middleware_name, "strip-session-ab12cd34");
        assert_eq!(route.backend_port, 5800);
    }

    #[test]
    fn test_distinct_sessions_do_not_share_resource_names() {
        let a = RouteDescriptor::generate(&sid("aaaa0000"), 5800, "web");
        let b = RouteDescriptor::generate(&sid("bbbb1111"), 5800, "web");
        assert_ne!(a.router_name, b.router_name);
        assert_ne!(a.middleware_name, b.middleware_name);

        let shared: Vec<_> = a
            .labels()
            .into_keys()
            .filter(|k| b.labels().contains_key(k))
            .collect();
        assert_eq!(shared, vec!["ephemera.session-id", "traefik.enable"]);
    }

    #[test]
    fn test_labels_declare_router_service_and_strip_middleware() {
        let labels = RouteDescriptor::generate(&sid("ab12cd34"), 5800, "web").labels();

        assert_eq!(labels["traefik.enable"], "true");
        assert_eq!(
            labels["traefik.http.routers.session-ab12cd34.rule"],
            "PathPrefix(`/session/ab12cd34`)"
        );
        assert_eq!(labels["traefik.http.routers.session-ab12cd34.entrypoints"], "web");
        assert_eq!(
            labels["traefik.http.routers.session-ab12cd34.middlewares"],
            "strip-session-ab12cd34"
        );
        assert_eq!(
            labels["traefik.http.services.session-ab12cd34.loadbalancer.server.port"],
            "5800"
        );
        assert_eq!(
            labels["traefik.http.middlewares.strip-session-ab12cd34.stripprefix.prefixes"],
            "/session/ab12cd34"
        );
        assert_eq!(labels[SESSION_LABEL], "ab12cd34");
    }
}
