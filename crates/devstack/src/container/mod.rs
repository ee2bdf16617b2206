//! Container runtime management module.
//!
//! Provides an async interface to the Docker or Podman CLI. This is the
//! "Docker Status Source" the relay polls: every call is a one-shot snapshot,
//! never a stream. The runtime is auto-detected or can be configured explicitly.

mod container;
mod error;

pub use container::{
    Container, ContainerState, ContainerStats, normalize_name, parse_health,
    validate_container_id_or_name,
};
pub use error::{ContainerError, ContainerResult};

use container::{parse_json_records, parse_ps_output};

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    /// Docker runtime (default)
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl RuntimeType {
    /// Get the default binary name for this runtime.
    pub fn default_binary(&self) -> &'static str {
        match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_binary())
    }
}

/// Runtime-wide information for the dashboard header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub runtime: RuntimeType,
    pub version: String,
    pub containers_running: usize,
    pub containers_total: usize,
}

/// Container runtime abstraction for testability.
#[async_trait]
pub trait ContainerRuntimeApi: Send + Sync {
    /// List containers; `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> ContainerResult<Vec<Container>>;

    /// Single stats snapshot. Fails with `ContainerNotFound` if the container is gone.
    async fn get_stats(&self, container_id: &str) -> ContainerResult<ContainerStats>;

    async fn start_container(&self, container_id: &str) -> ContainerResult<()>;
    async fn stop_container(
        &self,
        container_id: &str,
        timeout_seconds: Option<u32>,
    ) -> ContainerResult<()>;
    async fn restart_container(&self, container_id: &str) -> ContainerResult<()>;
    async fn remove_container(&self, container_id: &str, force: bool) -> ContainerResult<()>;

    /// Last `tail` log lines (stdout and stderr interleaved).
    async fn get_logs(&self, container_id: &str, tail: Option<u32>) -> ContainerResult<String>;

    async fn system_info(&self) -> ContainerResult<SystemInfo>;
}

/// Container runtime client driving the docker/podman binary.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    /// The runtime type (docker or podman)
    runtime_type: RuntimeType,
    /// Path to the container binary
    binary: String,
}

#[async_trait]
impl ContainerRuntimeApi for ContainerRuntime {
    async fn list_containers(&self, all: bool) -> ContainerResult<Vec<Container>> {
        self.list_containers(all).await
    }

    async fn get_stats(&self, container_id: &str) -> ContainerResult<ContainerStats> {
        self.get_stats(container_id).await
    }

    async fn start_container(&self, container_id: &str) -> ContainerResult<()> {
        self.simple_command("start", container_id, &[]).await
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout_seconds: Option<u32>,
    ) -> ContainerResult<()> {
        let timeout = timeout_seconds.map(|t| t.to_string());
        let extra: Vec<&str> = match timeout.as_deref() {
            Some(t) => vec!["-t", t],
            None => vec![],
        };
        self.simple_command("stop", container_id, &extra).await
    }

    async fn restart_container(&self, container_id: &str) -> ContainerResult<()> {
        self.simple_command("restart", container_id, &[]).await
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> ContainerResult<()> {
        let extra: &[&str] = if force { &["-f"] } else { &[] };
        self.simple_command("rm", container_id, extra).await
    }

    async fn get_logs(&self, container_id: &str, tail: Option<u32>) -> ContainerResult<String> {
        self.get_logs(container_id, tail).await
    }

    async fn system_info(&self) -> ContainerResult<SystemInfo> {
        self.system_info().await
    }
}

impl Default for ContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime {
    /// Create a new container runtime with auto-detection.
    ///
    /// Prefers Docker, falls back to Podman.
    pub fn new() -> Self {
        if Self::is_binary_available("docker") {
            Self::with_type(RuntimeType::Docker)
        } else if Self::is_binary_available("podman") {
            Self::with_type(RuntimeType::Podman)
        } else {
            // Fall back to docker, will fail at runtime
            Self::with_type(RuntimeType::Docker)
        }
    }

    /// Create a container runtime with a specific type.
    pub fn with_type(runtime_type: RuntimeType) -> Self {
        Self {
            binary: runtime_type.default_binary().to_string(),
            runtime_type,
        }
    }

    /// Create a container runtime with a custom binary path.
    pub fn with_binary(runtime_type: RuntimeType, binary: impl Into<String>) -> Self {
        Self {
            runtime_type,
            binary: binary.into(),
        }
    }

    /// Get the runtime type.
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    /// Check if a binary is available in PATH.
    fn is_binary_available(name: &str) -> bool {
        std::process::Command::new("which")
            .arg(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run the binary and return stdout, or the classified failure.
    async fn run(&self, command: &str, target: &str, args: &[&str]) -> ContainerResult<String> {
        debug!("{} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContainerError::CommandFailed {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::from_stderr(command, target, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// `<binary> <command> [extra...] <container>` with no interesting output.
    async fn simple_command(
        &self,
        command: &str,
        container_id: &str,
        extra: &[&str],
    ) -> ContainerResult<()> {
        validate_container_id_or_name(container_id)?;

        let mut args = vec![command];
        args.extend_from_slice(extra);
        args.push(container_id);

        self.run(command, container_id, &args).await.map(|_| ())
    }

    /// Check if the container runtime is available and working.
    pub async fn health_check(&self) -> ContainerResult<String> {
        self.run("version", "", &["version", "--format", "json"])
            .await
    }

    /// List containers.
    pub async fn list_containers(&self, all: bool) -> ContainerResult<Vec<Container>> {
        let mut args = vec!["ps", "--format", "json", "--no-trunc"];

        if all {
            args.push("-a");
        }

        let stdout = self.run("ps", "", &args).await?;
        parse_ps_output(&stdout)
    }

    /// Get container stats (single snapshot).
    pub async fn get_stats(&self, container_id: &str) -> ContainerResult<ContainerStats> {
        validate_container_id_or_name(container_id)?;

        let stdout = self
            .run(
                "stats",
                container_id,
                &["stats", "--no-stream", "--format", "json", container_id],
            )
            .await?;

        let stats: Vec<ContainerStats> = parse_json_records(&stdout)?;
        stats
            .into_iter()
            .next()
            .ok_or_else(|| ContainerError::ContainerNotFound(container_id.to_string()))
    }

    /// Get container logs.
    pub async fn get_logs(&self, container_id: &str, tail: Option<u32>) -> ContainerResult<String> {
        validate_container_id_or_name(container_id)?;

        let mut owned_args: Vec<String> = vec!["logs".to_string(), "--timestamps".to_string()];

        if let Some(n) = tail {
            owned_args.push("--tail".to_string());
            owned_args.push(n.to_string());
        }

        owned_args.push(container_id.to_string());

        let output = Command::new(&self.binary)
            .args(&owned_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContainerError::CommandFailed {
                command: "logs".to_string(),
                message: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ContainerError::from_stderr("logs", container_id, &stderr));
        }

        // Logs command outputs to stderr for container stderr
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(format!("{}{}", stdout, stderr))
    }

    /// Runtime version plus container counts.
    pub async fn system_info(&self) -> ContainerResult<SystemInfo> {
        let version = self
            .run(
                "version",
                "",
                &["version", "--format", "{{.Server.Version}}"],
            )
            .await
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let containers = self.list_containers(true).await?;
        let containers_running = containers.iter().filter(|c| c.is_running()).count();

        Ok(SystemInfo {
            runtime: self.runtime_type,
            version,
            containers_running,
            containers_total: containers.len(),
        })
    }
}
