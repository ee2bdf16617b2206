//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use devstack::api::{self, AppState};
use devstack::catalog::Catalog;
use devstack::container::{
    Container, ContainerError, ContainerResult, ContainerRuntimeApi, ContainerState,
    ContainerStats, RuntimeType, SystemInfo,
};
use devstack::ws::{RelayConfig, RelayHub};

/// In-memory container runtime recording every lifecycle call.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<Container>>,
    calls: Mutex<Vec<String>>,
    unreachable: Mutex<bool>,
}

impl FakeRuntime {
    pub fn with_containers(containers: Vec<Container>) -> Self {
        let runtime = Self::default();
        *runtime.containers.lock().unwrap() = containers;
        runtime
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    /// Lifecycle calls in order, as `"<op> <name>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check_reachable(&self, command: &str) -> ContainerResult<()> {
        if *self.unreachable.lock().unwrap() {
            return Err(ContainerError::CommandFailed {
                command: command.to_string(),
                message: "Cannot connect to the Docker daemon".to_string(),
            });
        }
        Ok(())
    }

    fn find(&self, id_or_name: &str) -> ContainerResult<Container> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id_or_name || c.primary_name() == id_or_name)
            .cloned()
            .ok_or_else(|| ContainerError::ContainerNotFound(id_or_name.to_string()))
    }

    fn record(&self, op: &str, target: &str) -> ContainerResult<()> {
        self.check_reachable(op)?;
        self.find(target)?;
        self.calls.lock().unwrap().push(format!("{op} {target}"));
        Ok(())
    }
}

pub fn container(name: &str, state: ContainerState) -> Container {
    Container {
        id: format!("{name}-id"),
        names: vec![name.to_string()],
        image: format!("{name}:latest"),
        state,
        status: match state {
            ContainerState::Running => "Up 2 minutes".to_string(),
            _ => "Exited (0) 2 minutes ago".to_string(),
        },
        created_at: "2024-01-01 00:00:00 +0000 UTC".to_string(),
        ports: String::new(),
        health: None,
    }
}

#[async_trait]
impl ContainerRuntimeApi for FakeRuntime {
    async fn list_containers(&self, _all: bool) -> ContainerResult<Vec<Container>> {
        self.check_reachable("ps")?;
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn get_stats(&self, container_id: &str) -> ContainerResult<ContainerStats> {
        self.check_reachable("stats")?;
        let container = self.find(container_id)?;
        Ok(ContainerStats {
            container_id: container.id.clone(),
            name: container.primary_name().to_string(),
            cpu_percent: "2.50%".to_string(),
            mem_usage: "64MiB / 2GiB".to_string(),
            mem_percent: "3.12%".to_string(),
            net_io: "1kB / 2kB".to_string(),
            block_io: "0B / 0B".to_string(),
            pids: "7".to_string(),
        })
    }

    async fn start_container(&self, container_id: &str) -> ContainerResult<()> {
        self.record("start", container_id)
    }

    async fn stop_container(
        &self,
        container_id: &str,
        _timeout_seconds: Option<u32>,
    ) -> ContainerResult<()> {
        self.record("stop", container_id)
    }

    async fn restart_container(&self, container_id: &str) -> ContainerResult<()> {
        self.record("restart", container_id)
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> ContainerResult<()> {
        let container = self.find(container_id)?;
        if container.is_running() && !force {
            return Err(ContainerError::CommandFailed {
                command: "rm".to_string(),
                message: format!(
                    "Error response from daemon: You cannot remove a running container {}",
                    container.id
                ),
            });
        }
        self.record("rm", container_id)?;
        self.containers
            .lock()
            .unwrap()
            .retain(|c| c.id != container.id);
        Ok(())
    }

    async fn get_logs(&self, container_id: &str, tail: Option<u32>) -> ContainerResult<String> {
        self.check_reachable("logs")?;
        let container = self.find(container_id)?;
        Ok(format!(
            "{} tail={}\n",
            container.primary_name(),
            tail.map(|t| t.to_string()).unwrap_or_default()
        ))
    }

    async fn system_info(&self) -> ContainerResult<SystemInfo> {
        self.check_reachable("version")?;
        let containers = self.containers.lock().unwrap();
        Ok(SystemInfo {
            runtime: RuntimeType::Docker,
            version: "27.0.0".to_string(),
            containers_running: containers.iter().filter(|c| c.is_running()).count(),
            containers_total: containers.len(),
        })
    }
}

/// Containers for the built-in catalog: postgres running, stack half there.
pub fn default_containers() -> Vec<Container> {
    vec![
        container("postgres", ContainerState::Running),
        container("opensearch-node", ContainerState::Exited),
        container("scratch", ContainerState::Running),
    ]
}

pub struct TestApp {
    pub router: Router,
    pub runtime: Arc<FakeRuntime>,
    pub relay: Arc<RelayHub>,
}

/// Create a test application backed by the built-in catalog.
pub fn test_app() -> TestApp {
    test_app_with(FakeRuntime::with_containers(default_containers()))
}

pub fn test_app_with(runtime: FakeRuntime) -> TestApp {
    let runtime = Arc::new(runtime);
    let catalog = Arc::new(Catalog::builtin());
    let relay = Arc::new(RelayHub::new(
        runtime.clone(),
        catalog.clone(),
        RelayConfig::default(),
    ));
    let state = AppState::new(runtime.clone(), catalog, relay.clone());
    TestApp {
        router: api::create_router(state),
        runtime,
        relay,
    }
}

pub async fn send(router: &Router, method: Method, uri: &str) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(method)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Send a request and return status plus parsed JSON body.
pub async fn request(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = send(router, method, uri).await;
    let status = response.status();
    (status, json_body(response).await)
}

pub fn by_id<'a>(items: &'a Value, id: &str) -> &'a Value {
    items
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["id"] == id)
        .unwrap()
}
