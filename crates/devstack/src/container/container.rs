//! Container snapshot types and CLI output parsing.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::{ContainerError, ContainerResult};

/// Names arrive as a comma-separated string from docker and as an array from podman.
fn deserialize_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let names = match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    Ok(names)
}

/// Ports arrive as a preformatted string from docker and as structured
/// bindings (or null) from podman. Both are flattened to docker's format.
fn deserialize_ports<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let ports = match value {
        Some(Value::String(s)) => s,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|binding| {
                let container_port = binding.get("container_port")?.as_u64()?;
                let protocol = binding
                    .get("protocol")
                    .and_then(Value::as_str)
                    .unwrap_or("tcp");
                match binding.get("host_port").and_then(Value::as_u64) {
                    Some(host_port) if host_port > 0 => {
                        let host_ip = binding
                            .get("host_ip")
                            .and_then(Value::as_str)
                            .filter(|ip| !ip.is_empty())
                            .unwrap_or("0.0.0.0");
                        Some(format!(
                            "{host_ip}:{host_port}->{container_port}/{protocol}"
                        ))
                    }
                    _ => Some(format!("{container_port}/{protocol}")),
                }
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };
    Ok(ports)
}

/// Container state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Container is being created.
    Created,
    /// Container is running.
    Running,
    /// Container is paused.
    Paused,
    /// Container is restarting.
    Restarting,
    /// Container is being removed.
    Removing,
    /// Container has exited.
    Exited,
    /// Container is dead.
    Dead,
    /// Unknown state.
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Created => write!(f, "created"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Paused => write!(f, "paused"),
            ContainerState::Restarting => write!(f, "restarting"),
            ContainerState::Removing => write!(f, "removing"),
            ContainerState::Exited => write!(f, "exited"),
            ContainerState::Dead => write!(f, "dead"),
            ContainerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Point-in-time snapshot of one container, as listed by `ps`.
///
/// Snapshots are replaced wholesale on every poll and never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container ID.
    #[serde(rename(deserialize = "ID"), alias = "Id", alias = "id")]
    pub id: String,

    /// Container names as reported by the runtime.
    #[serde(
        default,
        rename(deserialize = "Names"),
        deserialize_with = "deserialize_names"
    )]
    pub names: Vec<String>,

    /// Image used.
    #[serde(default, rename(deserialize = "Image"))]
    pub image: String,

    /// Container state.
    #[serde(default, rename(deserialize = "State"))]
    pub state: ContainerState,

    /// Human status string (e.g., "Up 5 minutes").
    #[serde(default, rename(deserialize = "Status"))]
    pub status: String,

    /// Creation time as reported by the runtime.
    #[serde(default, rename(deserialize = "CreatedAt"))]
    pub created_at: String,

    /// Published ports in docker's `host:port->port/proto` notation.
    #[serde(
        default,
        rename(deserialize = "Ports"),
        deserialize_with = "deserialize_ports"
    )]
    pub ports: String,

    /// Healthcheck result parsed from `status`, when the image defines one.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl Container {
    /// Primary name with the leading path separator stripped (`/postgres` -> `postgres`).
    pub fn primary_name(&self) -> &str {
        self.names
            .first()
            .map(|name| normalize_name(name))
            .unwrap_or_default()
    }

    /// Whether the container is currently running.
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

/// Healthcheck state embedded in docker's status text.
///
/// `Up 2 hours (healthy)` -> `healthy`, `Up 3 seconds (health: starting)` -> `starting`.
pub fn parse_health(status: &str) -> Option<String> {
    let lower = status.to_lowercase();
    if lower.contains("(unhealthy)") {
        Some("unhealthy".to_string())
    } else if lower.contains("(healthy)") {
        Some("healthy".to_string())
    } else if lower.contains("(health: starting)") {
        Some("starting".to_string())
    } else {
        None
    }
}

/// Strip the leading `/` docker's API puts in front of container names.
pub fn normalize_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Container resource statistics (single snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// Container ID.
    #[serde(rename(deserialize = "ID"), alias = "id", alias = "ContainerID")]
    pub container_id: String,

    /// Container name.
    #[serde(default, rename(deserialize = "Name"), alias = "name")]
    pub name: String,

    /// CPU percentage.
    #[serde(default, rename(deserialize = "CPUPerc"), alias = "cpu_percent")]
    pub cpu_percent: String,

    /// Memory usage.
    #[serde(default, rename(deserialize = "MemUsage"), alias = "mem_usage")]
    pub mem_usage: String,

    /// Memory percentage.
    #[serde(default, rename(deserialize = "MemPerc"), alias = "mem_percent")]
    pub mem_percent: String,

    /// Network I/O.
    #[serde(default, rename(deserialize = "NetIO"), alias = "net_io")]
    pub net_io: String,

    /// Block I/O.
    #[serde(default, rename(deserialize = "BlockIO"), alias = "block_io")]
    pub block_io: String,

    /// Number of PIDs.
    #[serde(
        default,
        rename(deserialize = "PIDs"),
        alias = "pids",
        deserialize_with = "deserialize_string_or_number"
    )]
    pub pids: String,
}

/// Podman reports some counters as numbers where docker uses strings.
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

/// Parse JSON emitted by `ps`/`stats --format json`.
///
/// Docker prints one object per line, podman prints a single array.
pub(crate) fn parse_json_records<T>(stdout: &str) -> ContainerResult<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ContainerError::ParseError(e.to_string()));
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| ContainerError::ParseError(e.to_string()))
        })
        .collect()
}

/// Parse `ps --format json` output and derive each container's health.
pub(crate) fn parse_ps_output(stdout: &str) -> ContainerResult<Vec<Container>> {
    let mut containers: Vec<Container> = parse_json_records(stdout)?;
    for container in &mut containers {
        container.health = parse_health(&container.status);
    }
    Ok(containers)
}

/// Validate a container ID or name before passing it to the runtime binary.
///
/// Container IDs are hex strings, names are alphanumeric with `-`, `_` and `.`.
pub fn validate_container_id_or_name(id: &str) -> ContainerResult<()> {
    if id.is_empty() {
        return Err(ContainerError::InvalidInput(
            "container ID or name cannot be empty".to_string(),
        ));
    }

    if id.len() > 128 {
        return Err(ContainerError::InvalidInput(
            "container ID or name exceeds maximum length".to_string(),
        ));
    }

    if id.starts_with('-') || id.starts_with('.') {
        return Err(ContainerError::InvalidInput(format!(
            "container ID or name '{}' must start with an alphanumeric character",
            id
        )));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.';
    if !id.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "container ID or name '{}' contains invalid characters",
            id
        )));
    }

    Ok(())
}
