//! Service status aggregation.
//!
//! Pure mapping from the service catalog and the latest container snapshot to
//! per-service status. Grouped services are `running` when any member runs
//! and `exists` only when every member exists.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::{Catalog, ServiceDefinition, ServicePort};
use crate::container::Container;

/// Kind of catalog entry a status was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Single,
    Grouped,
}

/// Status of one backing container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberStatus {
    pub container_name: String,
    pub name: String,
    pub exists: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// `healthy`, `unhealthy` or `starting` when the container has a healthcheck.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub ports: Vec<ServicePort>,
}

/// Derived status of one logical service. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ServiceKind,
    pub exists: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// `healthy`, `unhealthy` or `starting` when the container has a healthcheck.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub ports: Vec<ServicePort>,
    /// Per-member detail, present for grouped services only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberStatus>>,
}

/// Totals over an aggregated status list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub services: usize,
    pub running: usize,
    pub missing: usize,
}

/// Compute the status of every catalog entry against `snapshot`, in catalog order.
pub fn aggregate(catalog: &Catalog, snapshot: &[Container]) -> Vec<ServiceStatus> {
    // First container wins if two report the same primary name.
    let mut by_name: HashMap<&str, &Container> = HashMap::with_capacity(snapshot.len());
    for container in snapshot {
        by_name.entry(container.primary_name()).or_insert(container);
    }

    catalog
        .iter()
        .map(|definition| aggregate_one(definition, &by_name))
        .collect()
}

fn member_status(
    container_name: &str,
    name: &str,
    ports: &[ServicePort],
    by_name: &HashMap<&str, &Container>,
) -> MemberStatus {
    match by_name.get(container_name) {
        Some(container) => MemberStatus {
            container_name: container_name.to_string(),
            name: name.to_string(),
            exists: true,
            running: container.is_running(),
            container_id: Some(container.id.clone()),
            status: Some(container.status.clone()),
            state: Some(container.state.to_string()),
            health: container.health.clone(),
            image: Some(container.image.clone()),
            ports: ports.to_vec(),
        },
        None => MemberStatus {
            container_name: container_name.to_string(),
            name: name.to_string(),
            exists: false,
            running: false,
            container_id: None,
            status: None,
            state: None,
            health: None,
            image: None,
            ports: ports.to_vec(),
        },
    }
}

fn aggregate_one(
    definition: &ServiceDefinition,
    by_name: &HashMap<&str, &Container>,
) -> ServiceStatus {
    match definition {
        ServiceDefinition::Single(single) => {
            let member = member_status(
                &single.container_name,
                &single.name,
                &single.ports,
                by_name,
            );
            ServiceStatus {
                id: single.id.clone(),
                name: single.name.clone(),
                description: single.description.clone(),
                kind: ServiceKind::Single,
                exists: member.exists,
                running: member.running,
                container_id: member.container_id,
                status: member.status,
                state: member.state,
                health: member.health,
                image: member.image,
                ports: member.ports,
                members: None,
            }
        }
        ServiceDefinition::Grouped(group) => {
            let members: Vec<MemberStatus> = group
                .members
                .iter()
                .map(|m| member_status(&m.container_name, &m.name, &m.ports, by_name))
                .collect();
            // Asymmetric on purpose: a partially deployed stack still shows as
            // running, but only exists once every member is present.
            let running = members.iter().any(|m| m.running);
            let exists = members.iter().all(|m| m.exists);
            let ports = members.iter().flat_map(|m| m.ports.clone()).collect();

            ServiceStatus {
                id: group.id.clone(),
                name: group.name.clone(),
                description: group.description.clone(),
                kind: ServiceKind::Grouped,
                exists,
                running,
                container_id: None,
                status: None,
                state: None,
                health: None,
                image: None,
                ports,
                members: Some(members),
            }
        }
    }
}

/// Count services, running services and services with missing containers.
pub fn summarize(statuses: &[ServiceStatus]) -> StatusSummary {
    StatusSummary {
        services: statuses.len(),
        running: statuses.iter().filter(|s| s.running).count(),
        missing: statuses.iter().filter(|s| !s.exists).count(),
    }
}
