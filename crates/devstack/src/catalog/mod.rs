//! Static catalog of the logical services this dashboard manages.
//!
//! A service is backed either by one container or by an ordered group of
//! member containers. The catalog is loaded once at startup and is read-only
//! afterwards.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate service id: {0}")]
    DuplicateId(String),

    #[error("service id cannot be empty")]
    EmptyId,

    #[error("service id '{0}' is reserved")]
    ReservedId(String),

    #[error("service '{0}' has an empty container name")]
    EmptyContainerName(String),

    #[error("grouped service '{0}' has no members")]
    NoMembers(String),

    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A published port of a service container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub container: u16,
    pub host: u16,
    #[serde(default)]
    pub description: String,
}

impl ServicePort {
    pub fn new(container: u16, host: u16, description: impl Into<String>) -> Self {
        Self {
            container,
            host,
            description: description.into(),
        }
    }
}

/// One logical service backed by exactly one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub container_name: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

/// One member container of a grouped service, with its own display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberContainer {
    pub container_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

/// One logical service backed by an ordered list of containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<MemberContainer>,
}

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceDefinition {
    Single(SingleService),
    Grouped(GroupedService),
}

impl ServiceDefinition {
    pub fn id(&self) -> &str {
        match self {
            ServiceDefinition::Single(s) => &s.id,
            ServiceDefinition::Grouped(g) => &g.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServiceDefinition::Single(s) => &s.name,
            ServiceDefinition::Grouped(g) => &g.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ServiceDefinition::Single(s) => &s.description,
            ServiceDefinition::Grouped(g) => &g.description,
        }
    }

    /// Backing container names, in member order.
    pub fn container_names(&self) -> Vec<&str> {
        match self {
            ServiceDefinition::Single(s) => vec![s.container_name.as_str()],
            ServiceDefinition::Grouped(g) => g
                .members
                .iter()
                .map(|m| m.container_name.as_str())
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.id().trim().is_empty() {
            return Err(CatalogError::EmptyId);
        }
        // Taken by the catalog-wide `/services/start` and `/services/stop` routes.
        if RESERVED_IDS.contains(&self.id()) {
            return Err(CatalogError::ReservedId(self.id().to_string()));
        }
        if let ServiceDefinition::Grouped(g) = self
            && g.members.is_empty()
        {
            return Err(CatalogError::NoMembers(g.id.clone()));
        }
        if self.container_names().iter().any(|n| n.trim().is_empty()) {
            return Err(CatalogError::EmptyContainerName(self.id().to_string()));
        }
        Ok(())
    }
}

const RESERVED_IDS: [&str; 2] = ["start", "stop"];

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    services: Vec<ServiceDefinition>,
}

/// Ordered, validated set of service definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    services: Vec<ServiceDefinition>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids and malformed entries.
    pub fn new(services: Vec<ServiceDefinition>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for service in &services {
            service.validate()?;
            if !seen.insert(service.id().to_string()) {
                return Err(CatalogError::DuplicateId(service.id().to_string()));
            }
        }
        Ok(Self { services })
    }

    /// Parse a TOML catalog (`[[services]]` tables tagged by `kind`).
    pub fn from_toml(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::new(file.services)
    }

    /// Load a TOML catalog from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// The built-in catalog: PostgreSQL, Redis and the OpenSearch stack.
    pub fn builtin() -> Self {
        Self {
            services: vec![
                ServiceDefinition::Single(SingleService {
                    id: "postgres".to_string(),
                    name: "PostgreSQL".to_string(),
                    description: "PostgreSQL database server for local development".to_string(),
                    container_name: "postgres".to_string(),
                    ports: vec![ServicePort::new(5432, 5432, "PostgreSQL")],
                }),
                ServiceDefinition::Single(SingleService {
                    id: "redis".to_string(),
                    name: "Redis".to_string(),
                    description: "Redis cache and message broker for local development"
                        .to_string(),
                    container_name: "redis".to_string(),
                    ports: vec![ServicePort::new(6379, 6379, "Redis")],
                }),
                ServiceDefinition::Grouped(GroupedService {
                    id: "stack".to_string(),
                    name: "OpenSearch Stack".to_string(),
                    description: "OpenSearch engine with its dashboards".to_string(),
                    members: vec![
                        MemberContainer {
                            container_name: "opensearch-node".to_string(),
                            name: "OpenSearch".to_string(),
                            description: "OpenSearch engine for search and analytics"
                                .to_string(),
                            ports: vec![
                                ServicePort::new(9200, 9200, "OpenSearch API"),
                                ServicePort::new(9600, 9600, "OpenSearch Performance Analyzer"),
                            ],
                        },
                        MemberContainer {
                            container_name: "opensearch-dashboards".to_string(),
                            name: "OpenSearch Dashboards".to_string(),
                            description: "Web interface for OpenSearch data visualization"
                                .to_string(),
                            ports: vec![ServicePort::new(5601, 5601, "Dashboards Web UI")],
                        },
                    ],
                }),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.id() == id)
    }

    /// Backing container names of a service, or `None` for an unknown id.
    pub fn container_names(&self, id: &str) -> Option<Vec<&str>> {
        self.get(id).map(ServiceDefinition::container_names)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
