// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker launcher implementation.
//!
//! Drives the `docker` CLI. Pure engine logic, no session state.
//! Failures are classified from the CLI's stderr:
//! - daemon unreachable / CLI missing -> [`LauncherError::Unavailable`]
//! - "No such container" / "No such object" -> [`LauncherError::NotFound`]
//! - anything else -> the operation-specific error

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::launcher::{
    LaunchSpec, LauncherError, Result, WorkloadHandle, WorkloadLauncher, WorkloadState,
};

/// Markers the CLI prints when the daemon cannot be reached.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "error during connect",
    "Is the docker daemon running",
];

/// Markers the CLI prints for unknown containers.
const NOT_FOUND_MARKERS: &[&str] = &["No such container", "No such object"];

/// Docker launcher configuration
#[derive(Debug, Clone)]
pub struct DockerLauncherConfig {
    /// Path to the docker CLI
    pub docker_bin: String,
    /// Upper bound on `docker run` (includes image pull)
    pub launch_timeout: Duration,
    /// Upper bound on inspect/rm/version calls
    pub call_timeout: Duration,
}

impl Default for DockerLauncherConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            launch_timeout: Duration::from_secs(120),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for DockerLauncherConfig {
    fn from(config: &Config) -> Self {
        Self {
            docker_bin: config.docker_bin.clone(),
            launch_timeout: config.launch_timeout,
            ..Self::default()
        }
    }
}

/// Workload launcher backed by the docker CLI.
pub struct DockerLauncher {
    config: DockerLauncherConfig,
}

impl DockerLauncher {
    /// Create a new docker launcher.
    pub fn new(config: DockerLauncherConfig) -> Self {
        Self { config }
    }

    /// Run the CLI and return trimmed stdout, or the raw stderr on failure.
    async fn docker(
        &self,
        args: &[String],
        timeout: Duration,
    ) -> Result<std::result::Result<String, String>> {
        debug!(docker_bin = %self.config.docker_bin, args = ?args, "Running docker");

        let mut cmd = Command::new(&self.config.docker_bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => return Err(LauncherError::Timeout(timeout)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LauncherError::Unavailable(format!(
                    "docker CLI not found at '{}'",
                    self.config.docker_bin
                )));
            }
            Ok(Err(e)) => return Err(LauncherError::Io(e)),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            Ok(Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(Err(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

/// Build `docker run` arguments for a launch spec.
pub fn run_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if spec.detach {
        args.push("--detach".to_string());
    }
    if spec.auto_remove {
        args.push("--rm".to_string());
    }
    args.push("--name".to_string());
    args.push(spec.container_name.clone());
    args.push("--network".to_string());
    args.push(spec.network.clone());
    for (key, value) in spec.labels() {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
    for (key, value) in &spec.env {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

/// Classify CLI stderr into a launcher error.
pub fn classify(
    stderr: &str,
    target: &str,
    fallback: fn(String) -> LauncherError,
) -> LauncherError {
    if UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        LauncherError::Unavailable(stderr.to_string())
    } else if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        LauncherError::NotFound(target.to_string())
    } else {
        fallback(stderr.to_string())
    }
}

/// Parse `docker inspect --format '{{.Id}} {{.Name}} {{.State.Status}}'` output.
pub fn parse_inspect(line: &str) -> Option<WorkloadHandle> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?;
    let name = parts.next()?.trim_start_matches('/');
    let status = parts.next()?;
    Some(WorkloadHandle {
        id: id.to_string(),
        name: name.to_string(),
        state: WorkloadState::parse(status),
    })
}

#[async_trait]
impl WorkloadLauncher for DockerLauncher {
    fn launcher_type(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        let args = vec![
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ];
        match self.docker(&args, self.config.call_timeout).await {
            Ok(Ok(version)) => {
                info!(server_version = %version, "Connected to docker daemon");
                Ok(())
            }
            Ok(Err(stderr)) => Err(LauncherError::Unavailable(stderr)),
            Err(LauncherError::Timeout(t)) => Err(LauncherError::Unavailable(format!(
                "docker daemon did not answer within {t:?}"
            ))),
            Err(e) => Err(e),
        }
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<WorkloadHandle> {
        let args = run_args(spec);
        match self.docker(&args, self.config.launch_timeout).await? {
            Ok(stdout) => {
                let id = stdout.lines().last().unwrap_or_default().trim().to_string();
                if id.is_empty() {
                    return Err(LauncherError::Launch(
                        "docker run returned no container id".to_string(),
                    ));
                }
                Ok(WorkloadHandle {
                    id,
                    name: spec.container_name.clone(),
                    state: WorkloadState::Running,
                })
            }
            Err(stderr) => match classify(&stderr, &spec.container_name, LauncherError::Launch) {
                // `run` never targets an existing container; a missing image or network
                // is a launch failure.
                LauncherError::NotFound(_) => Err(LauncherError::Launch(stderr)),
                e => Err(e),
            },
        }
    }

    async fn inspect(&self, name_or_id: &str) -> Result<WorkloadHandle> {
        let args = vec![
            "inspect".to_string(),
            "--type".to_string(),
            "container".to_string(),
            "--format".to_string(),
            "{{.Id}} {{.Name}} {{.State.Status}}".to_string(),
            name_or_id.to_string(),
        ];
        match self.docker(&args, self.config.call_timeout).await? {
            Ok(stdout) => parse_inspect(&stdout).ok_or_else(|| {
                warn!(output = %stdout, "Unparseable docker inspect output");
                LauncherError::NotFound(name_or_id.to_string())
            }),
            Err(stderr) => Err(classify(&stderr, name_or_id, LauncherError::Other)),
        }
    }

    async fn stop(&self, handle: &WorkloadHandle, timeout: Duration) -> Result<()> {
        let args = vec![
            "stop".to_string(),
            "--time".to_string(),
            timeout.as_secs().to_string(),
            handle.id.clone(),
        ];
        // The engine gets the grace period plus our usual call budget.
        let budget = timeout + self.config.call_timeout;
        match self.docker(&args, budget).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(stderr)) => Err(classify(&stderr, &handle.name, LauncherError::Stop)),
            Err(LauncherError::Timeout(t)) => Err(LauncherError::Stop(format!(
                "docker stop did not finish within {t:?}"
            ))),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, handle: &WorkloadHandle, force: bool) -> Result<()> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(handle.id.clone());
        match self.docker(&args, self.config.call_timeout).await? {
            Ok(_) => Ok(()),
            Err(stderr) => Err(classify(&stderr, &handle.name, LauncherError::Remove)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionId;
    use crate::routing::RouteDescriptor;
    use std::collections::BTreeMap;

    fn spec() -> LaunchSpec {
        let session_id = SessionId::new("ab12cd34");
        let mut env = BTreeMap::new();
        env.insert("TZ".to_string(), "America/Toronto".to_string());
        LaunchSpec {
            image: "jlesage/firefox:latest".to_string(),
            container_name: "firefox-session-ab12cd34".to_string(),
            route: RouteDescriptor::generate(&session_id, 5800, "web"),
            network: "proxy_network".to_string(),
            env,
            detach: true,
            auto_remove: true,
        }
    }

    #[test]
    fn test_run_args_layout() {
        let args = run_args(&spec());

        assert_eq!(&args[..3], &["run", "--detach", "--rm"]);
        assert_eq!(args.last().map(String::as_str), Some("jlesage/firefox:latest"));

        let joined = args.join(" ");
        assert!(joined.contains("--name firefox-session-ab12cd34"));
        assert!(joined.contains("--network proxy_network"));
        assert!(joined.contains("--env TZ=America/Toronto"));
        assert!(joined.contains(
            "--label traefik.http.routers.session-ab12cd34.rule=PathPrefix(`/session/ab12cd34`)"
        ));
        assert!(joined.contains("--label ephemera.session-id=ab12cd34"));
    }

    #[test]
    fn test_run_args_without_detach_or_rm() {
        let mut spec = spec();
        spec.detach = false;
        spec.auto_remove = false;
        let args = run_args(&spec);
        assert!(!args.contains(&"--detach".to_string()));
        assert!(!args.contains(&"--rm".to_string()));
    }

    #[test]
    fn test_classify_stderr() {
        let e = classify(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
            "x",
            LauncherError::Stop,
        );
        assert!(matches!(e, LauncherError::Unavailable(_)));

        let e = classify(
            "Error response from daemon: No such container: firefox-session-x",
            "firefox-session-x",
            LauncherError::Stop,
        );
        assert!(matches!(e, LauncherError::NotFound(name) if name == "firefox-session-x"));

        let e = classify("permission denied", "x", LauncherError::Stop);
        assert!(matches!(e, LauncherError::Stop(msg) if msg == "permission denied"));
    }

    #[test]
    fn test_parse_inspect() {
        let handle = parse_inspect("4f2a9c0e1b7d /firefox-session-ab12cd34 running").unwrap();
        assert_eq!(handle.id, "4f2a9c0e1b7d");
        assert_eq!(handle.name, "firefox-session-ab12cd34");
        assert_eq!(handle.state, WorkloadState::Running);

        let handle = parse_inspect("4f2a /old exited").unwrap();
        assert_eq!(handle.state, WorkloadState::Exited);

        assert!(parse_inspect("").is_none());
        assert!(parse_inspect("onlyid").is_none());
    }

    #[tokio::test]
    async fn test_missing_cli_is_unavailable() {
        let launcher = DockerLauncher::new(DockerLauncherConfig {
            docker_bin: "/nonexistent/ephemera-docker".to_string(),
            ..DockerLauncherConfig::default()
        });

        assert!(matches!(
            launcher.ping().await,
            Err(LauncherError::Unavailable(_))
        ));
        assert!(matches!(
            launcher.inspect("anything").await,
            Err(LauncherError::Unavailable(_))
        ));
    }
}
