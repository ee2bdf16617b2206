//! API request handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::container::{Container, ContainerStats, SystemInfo};
use crate::status::{self, ServiceStatus, StatusSummary};
use crate::ws::RelaySnapshot;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Default number of log lines returned.
const DEFAULT_LOG_TAIL: u32 = 100;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}

// ============================================================================
// Services
// ============================================================================

async fn current_statuses(state: &AppState) -> ApiResult<Vec<ServiceStatus>> {
    let containers = state.runtime.list_containers(true).await?;
    Ok(status::aggregate(&state.catalog, &containers))
}

/// List all catalog services with their current status.
#[instrument(skip(state))]
pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<ServiceStatus>>> {
    Ok(Json(current_statuses(&state).await?))
}

/// Get the status of one service.
#[instrument(skip(state))]
pub async fn get_service(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> ApiResult<Json<ServiceStatus>> {
    if state.catalog.get(&service_id).is_none() {
        return Err(ApiError::not_found(format!("service {service_id}")));
    }
    current_statuses(&state)
        .await?
        .into_iter()
        .find(|s| s.id == service_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("service {service_id}")))
}

/// Lifecycle operation applied to a container or to every member of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
    Restart,
}

impl Action {
    async fn apply(self, state: &AppState, container: &str) -> ApiResult<()> {
        match self {
            Action::Start => state.runtime.start_container(container).await?,
            Action::Stop => state.runtime.stop_container(container, None).await?,
            Action::Restart => state.runtime.restart_container(container).await?,
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceActionResponse {
    pub service: String,
    pub action: Action,
    /// Containers acted on, in member order.
    pub containers: Vec<String>,
}

async fn service_action(
    state: &AppState,
    service_id: &str,
    action: Action,
) -> ApiResult<Json<ServiceActionResponse>> {
    let names: Vec<String> = state
        .catalog
        .container_names(service_id)
        .ok_or_else(|| ApiError::not_found(format!("service {service_id}")))?
        .into_iter()
        .map(str::to_string)
        .collect();

    for name in &names {
        action.apply(state, name).await?;
    }
    info!(service = service_id, ?action, "Service action applied");

    Ok(Json(ServiceActionResponse {
        service: service_id.to_string(),
        action,
        containers: names,
    }))
}

pub async fn start_service(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> ApiResult<Json<ServiceActionResponse>> {
    service_action(&state, &service_id, Action::Start).await
}

pub async fn stop_service(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> ApiResult<Json<ServiceActionResponse>> {
    service_action(&state, &service_id, Action::Stop).await
}

pub async fn restart_service(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> ApiResult<Json<ServiceActionResponse>> {
    service_action(&state, &service_id, Action::Restart).await
}

#[derive(Debug, Serialize)]
pub struct AllServicesActionResponse {
    pub action: Action,
    pub services: Vec<ServiceActionResponse>,
}

/// Apply `action` to every catalog service in catalog order, stopping at the first failure.
async fn all_services_action(
    state: &AppState,
    action: Action,
) -> ApiResult<Json<AllServicesActionResponse>> {
    let mut services = Vec::new();
    for definition in state.catalog.iter() {
        let Json(result) = service_action(state, definition.id(), action).await?;
        services.push(result);
    }
    Ok(Json(AllServicesActionResponse { action, services }))
}

pub async fn start_all_services(
    State(state): State<AppState>,
) -> ApiResult<Json<AllServicesActionResponse>> {
    all_services_action(&state, Action::Start).await
}

pub async fn stop_all_services(
    State(state): State<AppState>,
) -> ApiResult<Json<AllServicesActionResponse>> {
    all_services_action(&state, Action::Stop).await
}

#[derive(Debug, Deserialize)]
pub struct ServiceLogsQuery {
    pub tail: Option<u32>,
    /// Member container to read; defaults to the first one.
    pub container: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub container: String,
    pub logs: String,
}

/// Logs of one container backing a service.
pub async fn get_service_logs(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Query(query): Query<ServiceLogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let names = state
        .catalog
        .container_names(&service_id)
        .ok_or_else(|| ApiError::not_found(format!("service {service_id}")))?;

    let container = match query.container.as_deref() {
        Some(requested) if names.contains(&requested) => requested.to_string(),
        Some(requested) => {
            return Err(ApiError::bad_request(format!(
                "{requested} is not a container of service {service_id}"
            )));
        }
        None => names
            .first()
            .map(|n| n.to_string())
            .ok_or_else(|| ApiError::internal(format!("service {service_id} has no containers")))?,
    };

    let logs = state
        .runtime
        .get_logs(&container, Some(query.tail.unwrap_or(DEFAULT_LOG_TAIL)))
        .await?;
    Ok(Json(LogsResponse { container, logs }))
}

// ============================================================================
// Containers
// ============================================================================

/// List every container, running or not.
pub async fn list_containers(State(state): State<AppState>) -> ApiResult<Json<Vec<Container>>> {
    Ok(Json(state.runtime.list_containers(true).await?))
}

pub async fn get_container_stats(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> ApiResult<Json<ContainerStats>> {
    Ok(Json(state.runtime.get_stats(&container_id).await?))
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub container: String,
    pub action: String,
}

impl ActionResponse {
    fn new(container: String, action: &str) -> Json<Self> {
        Json(Self {
            container,
            action: action.to_string(),
        })
    }
}

pub async fn start_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    Action::Start.apply(&state, &container_id).await?;
    Ok(ActionResponse::new(container_id, "start"))
}

pub async fn stop_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    Action::Stop.apply(&state, &container_id).await?;
    Ok(ActionResponse::new(container_id, "stop"))
}

pub async fn restart_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    Action::Restart.apply(&state, &container_id).await?;
    Ok(ActionResponse::new(container_id, "restart"))
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn remove_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> ApiResult<Json<ActionResponse>> {
    state
        .runtime
        .remove_container(&container_id, query.force)
        .await?;
    info!(container = %container_id, force = query.force, "Container removed");
    Ok(ActionResponse::new(container_id, "remove"))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<u32>,
}

pub async fn get_container_logs(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let logs = state
        .runtime
        .get_logs(&container_id, Some(query.tail.unwrap_or(DEFAULT_LOG_TAIL)))
        .await?;
    Ok(Json(LogsResponse {
        container: container_id,
        logs,
    }))
}

// ============================================================================
// System & relay
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SystemResponse {
    #[serde(flatten)]
    pub info: SystemInfo,
    pub services: StatusSummary,
    pub timestamp: String,
}

/// Runtime version, container counts and service totals.
pub async fn system(State(state): State<AppState>) -> ApiResult<Json<SystemResponse>> {
    let info = state.runtime.system_info().await?;
    let statuses = current_statuses(&state).await?;
    Ok(Json(SystemResponse {
        info,
        services: status::summarize(&statuses),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Live relay sessions and polling cycles.
pub async fn relay(State(state): State<AppState>) -> Json<RelaySnapshot> {
    Json(state.relay.snapshot().await)
}
