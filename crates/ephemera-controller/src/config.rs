// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for ephemera-controller.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default public base URL. Almost always wrong outside local development.
pub const DEFAULT_PROXY_BASE_URL: &str = "http://localhost";

/// Controller configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server address for the front-end API
    pub http_addr: SocketAddr,
    /// Public URL of the reverse proxy, used to build session links
    pub proxy_base_url: String,
    /// Browser image launched for every session
    pub image: String,
    /// Port the image serves its web UI on
    pub internal_port: u16,
    /// Network shared with the reverse proxy
    pub network: String,
    /// Proxy entrypoint session routers bind to
    pub entrypoint: String,
    /// Prefix for deterministic container names
    pub container_prefix: String,
    /// Timezone passed to workloads as `TZ`
    pub timezone: String,
    /// Grace period given to the engine when stopping a workload
    pub stop_grace: Duration,
    /// Upper bound on a single `docker run`
    pub launch_timeout: Duration,
    /// Number of status events kept for display
    pub event_log_capacity: usize,
    /// Workload monitor interval (`None` disables the monitor)
    pub monitor_interval: Option<Duration>,
    /// Optional JSON snapshot file for session recovery across restarts
    pub state_file: Option<PathBuf>,
    /// Stop every session when the controller shuts down
    pub stop_on_shutdown: bool,
    /// Path to the docker CLI
    pub docker_bin: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_port("EPHEMERA_HTTP_PORT", 5000)?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let proxy_base_url = std::env::var("REVERSE_PROXY_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_PROXY_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let image = env_or("EPHEMERA_IMAGE", "jlesage/firefox:latest");
        let internal_port = parse_port("EPHEMERA_INTERNAL_PORT", 5800)?;
        if internal_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let network = env_or("EPHEMERA_NETWORK", "proxy_network");
        let entrypoint = env_or("EPHEMERA_ENTRYPOINT", "web");
        let container_prefix = env_or("EPHEMERA_CONTAINER_PREFIX", "firefox-session");
        let timezone = env_or("EPHEMERA_TIMEZONE", "America/Toronto");

        let stop_grace = Duration::from_secs(parse_u64("EPHEMERA_STOP_GRACE_SECONDS", 5)?);
        let launch_timeout =
            Duration::from_secs(parse_u64("EPHEMERA_LAUNCH_TIMEOUT_SECONDS", 120)?);
        let event_log_capacity = parse_u64("EPHEMERA_EVENT_LOG_CAPACITY", 10)? as usize;

        let monitor_interval = match parse_u64("EPHEMERA_MONITOR_INTERVAL_SECONDS", 30)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let state_file = std::env::var("EPHEMERA_STATE_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let stop_on_shutdown = std::env::var("EPHEMERA_STOP_ON_SHUTDOWN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let docker_bin = env_or("DOCKER_BIN", "docker");

        Ok(Self {
            http_addr,
            proxy_base_url,
            image,
            internal_port,
            network,
            entrypoint,
            container_prefix,
            timezone,
            stop_grace,
            launch_timeout,
            event_log_capacity,
            monitor_interval,
            state_file,
            stop_on_shutdown,
            docker_bin,
        })
    }

    /// Whether the proxy base URL is still the localhost default.
    pub fn uses_default_base_url(&self) -> bool {
        self.proxy_base_url == DEFAULT_PROXY_BASE_URL
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_port(var: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidPort),
        Err(_) => Ok(default),
    }
}

fn parse_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue(var, v)),
        Err(_) => Ok(default),
    }
}

/// Settings the lifecycle manager needs to build launch specs.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Browser image reference
    pub image: String,
    /// Port the image serves its web UI on
    pub internal_port: u16,
    /// Network shared with the reverse proxy
    pub network: String,
    /// Proxy entrypoint
    pub entrypoint: String,
    /// Container name prefix
    pub container_prefix: String,
    /// Environment passed to every workload
    pub env: BTreeMap<String, String>,
    /// Stop grace period
    pub stop_grace: Duration,
    /// Status log bound
    pub event_log_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("TZ".to_string(), "America/Toronto".to_string());
        Self {
            image: "jlesage/firefox:latest".to_string(),
            internal_port: 5800,
            network: "proxy_network".to_string(),
            entrypoint: "web".to_string(),
            container_prefix: "firefox-session".to_string(),
            env,
            stop_grace: Duration::from_secs(5),
            event_log_capacity: 10,
        }
    }
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        let mut env = BTreeMap::new();
        env.insert("TZ".to_string(), config.timezone.clone());
        Self {
            image: config.image.clone(),
            internal_port: config.internal_port,
            network: config.network.clone(),
            entrypoint: config.entrypoint.clone(),
            container_prefix: config.container_prefix.clone(),
            env,
            stop_grace: config.stop_grace,
            event_log_capacity: config.event_log_capacity,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A numeric setting could not be parsed.
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::DockerLauncherConfig;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "EPHEMERA_HTTP_PORT",
        "REVERSE_PROXY_BASE_URL",
        "EPHEMERA_IMAGE",
        "EPHEMERA_INTERNAL_PORT",
        "EPHEMERA_NETWORK",
        "EPHEMERA_ENTRYPOINT",
        "EPHEMERA_CONTAINER_PREFIX",
        "EPHEMERA_TIMEZONE",
        "EPHEMERA_STOP_GRACE_SECONDS",
        "EPHEMERA_LAUNCH_TIMEOUT_SECONDS",
        "EPHEMERA_EVENT_LOG_CAPACITY",
        "EPHEMERA_MONITOR_INTERVAL_SECONDS",
        "EPHEMERA_STATE_FILE",
        "EPHEMERA_STOP_ON_SHUTDOWN",
        "DOCKER_BIN",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        /// Start from a clean slate: every controller variable unset.
        fn cleared() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in VARS {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_from_env_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::cleared();

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr, SocketAddr::from(([0, 0, 0, 0], 5000)));
        assert!(config.uses_default_base_url());
        assert_eq!(config.image, "jlesage/firefox:latest");
        assert_eq!(config.internal_port, 5800);
        assert_eq!(config.timezone, "America/Toronto");
        assert_eq!(config.stop_grace, Duration::from_secs(5));
        assert_eq!(config.launch_timeout, Duration::from_secs(120));
        assert_eq!(config.monitor_interval, Some(Duration::from_secs(30)));
        assert!(config.state_file.is_none());
        assert!(!config.stop_on_shutdown);
        assert_eq!(config.docker_bin, "docker");
    }

    #[test]
    fn test_from_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::cleared();

        guard.set("EPHEMERA_HTTP_PORT", "8080");
        guard.set("REVERSE_PROXY_BASE_URL", "https://browsers.example.com/");
        guard.set("EPHEMERA_TIMEZONE", "Europe/Warsaw");
        guard.set("EPHEMERA_LAUNCH_TIMEOUT_SECONDS", "300");
        guard.set("EPHEMERA_MONITOR_INTERVAL_SECONDS", "0");
        guard.set("EPHEMERA_STATE_FILE", "/var/lib/ephemera/sessions.json");
        guard.set("EPHEMERA_STOP_ON_SHUTDOWN", "true");
        guard.set("DOCKER_BIN", "/usr/local/bin/docker");

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.proxy_base_url, "https://browsers.example.com");
        assert!(!config.uses_default_base_url());
        assert!(config.monitor_interval.is_none());
        assert_eq!(
            config.state_file,
            Some(PathBuf::from("/var/lib/ephemera/sessions.json"))
        );
        assert!(config.stop_on_shutdown);

        let manager = ManagerConfig::from(&config);
        assert_eq!(manager.env.get("TZ").map(String::as_str), Some("Europe/Warsaw"));

        let docker = DockerLauncherConfig::from(&config);
        assert_eq!(docker.docker_bin, "/usr/local/bin/docker");
        assert_eq!(docker.launch_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_from_env_rejects_bad_numbers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::cleared();

        guard.set("EPHEMERA_STOP_GRACE_SECONDS", "abc");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue("EPHEMERA_STOP_GRACE_SECONDS", ref v) if v == "abc"
        ));

        guard.remove("EPHEMERA_STOP_GRACE_SECONDS");
        guard.set("EPHEMERA_HTTP_PORT", "70000");
        assert!(matches!(Config::from_env(), Err(ConfigError::InvalidPort)));

        guard.set("EPHEMERA_HTTP_PORT", "5000");
        guard.set("EPHEMERA_INTERNAL_PORT", "0");
        assert!(matches!(Config::from_env(), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_manager_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.internal_port, 5800);
        assert_eq!(config.network, "proxy_network");
        assert_eq!(config.env.get("TZ").map(String::as_str), Some("America/Toronto"));
        assert_eq!(config.event_log_capacity, 10);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("EPHEMERA_STOP_GRACE_SECONDS", "abc".to_string());
        let msg = err.to_string();
        assert!(msg.contains("EPHEMERA_STOP_GRACE_SECONDS"));
        assert!(msg.contains("abc"));
    }
}
