//! API integration tests.

use axum::http::{Method, StatusCode};

mod common;
use common::{FakeRuntime, by_id, container, request, send, test_app, test_app_with};
use devstack::container::ContainerState;

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let (status, json) = request(&app.router, Method::GET, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_list_services_aggregates_catalog() {
    let app = test_app();
    let (status, json) = request(&app.router, Method::GET, "/api/services").await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["postgres", "redis", "stack"]);

    let postgres = by_id(&json, "postgres");
    assert_eq!(postgres["running"], true);
    assert_eq!(postgres["exists"], true);
    assert_eq!(postgres["kind"], "single");
    assert_eq!(postgres["image"], "postgres:latest");

    let redis = by_id(&json, "redis");
    assert_eq!(redis["exists"], false);
    assert!(redis.get("container_id").is_none());

    let stack = by_id(&json, "stack");
    assert_eq!(stack["kind"], "grouped");
    assert_eq!(stack["exists"], false);
    assert_eq!(stack["running"], false);
    assert_eq!(stack["members"][0]["exists"], true);
    assert_eq!(stack["members"][1]["exists"], false);
}

#[tokio::test]
async fn test_get_service() {
    let app = test_app();
    let (status, json) = request(&app.router, Method::GET, "/api/services/postgres").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["container_id"], "postgres-id");

    let (status, json) = request(&app.router, Method::GET, "/api/services/mysql").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_grouped_service_action_applies_to_members_in_order() {
    let app = test_app_with(FakeRuntime::with_containers(vec![
        container("opensearch-node", ContainerState::Exited),
        container("opensearch-dashboards", ContainerState::Exited),
    ]));

    let (status, json) = request(&app.router, Method::POST, "/api/services/stack/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "start");
    assert_eq!(
        app.runtime.calls(),
        vec!["start opensearch-node", "start opensearch-dashboards"]
    );
}

#[tokio::test]
async fn test_start_all_services_in_catalog_order() {
    let app = test_app_with(FakeRuntime::with_containers(vec![
        container("opensearch-dashboards", ContainerState::Exited),
        container("redis", ContainerState::Exited),
        container("postgres", ContainerState::Exited),
        container("opensearch-node", ContainerState::Exited),
    ]));

    let (status, json) = request(&app.router, Method::POST, "/api/services/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "start");
    let services: Vec<&str> = json["services"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["service"].as_str().unwrap())
        .collect();
    assert_eq!(services, vec!["postgres", "redis", "stack"]);
    assert_eq!(
        app.runtime.calls(),
        vec![
            "start postgres",
            "start redis",
            "start opensearch-node",
            "start opensearch-dashboards",
        ]
    );
}

#[tokio::test]
async fn test_stop_all_services_stops_at_first_failure() {
    // Default containers have no redis, so the walk stops there.
    let app = test_app();
    let (status, _) = request(&app.router, Method::POST, "/api/services/stop").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.runtime.calls(), vec!["stop postgres"]);
}

#[tokio::test]
async fn test_service_action_with_missing_member() {
    let app = test_app();
    let (status, _) = request(&app.router, Method::POST, "/api/services/stack/stop").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // The first member was acted on before the missing one was hit.
    assert_eq!(app.runtime.calls(), vec!["stop opensearch-node"]);
}

#[tokio::test]
async fn test_service_logs() {
    let app = test_app();
    let (status, json) =
        request(&app.router, Method::GET, "/api/services/postgres/logs?tail=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["container"], "postgres");
    assert_eq!(json["logs"], "postgres tail=5\n");

    let (status, _) = request(
        &app.router,
        Method::GET,
        "/api/services/postgres/logs?container=redis",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = request(
        &app.router,
        Method::GET,
        "/api/services/stack/logs?container=opensearch-node",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["logs"], "opensearch-node tail=100\n");
}

#[tokio::test]
async fn test_list_containers_and_stats() {
    let app = test_app();
    let (status, json) = request(&app.router, Method::GET, "/api/containers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 3);
    assert_eq!(json[0]["state"], "running");

    let (status, json) =
        request(&app.router, Method::GET, "/api/containers/postgres-id/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cpu_percent"], "2.50%");

    let (status, _) = request(&app.router, Method::GET, "/api/containers/ghost/stats").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_container_lifecycle() {
    let app = test_app();
    for action in ["start", "stop", "restart"] {
        let uri = format!("/api/containers/scratch/{action}");
        let (status, json) = request(&app.router, Method::POST, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["action"], action);
    }
    assert_eq!(
        app.runtime.calls(),
        vec!["start scratch", "stop scratch", "restart scratch"]
    );
}

#[tokio::test]
async fn test_remove_running_container_requires_force() {
    let app = test_app();
    let (status, json) = request(&app.router, Method::DELETE, "/api/containers/scratch").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");

    let (status, _) = request(
        &app.router,
        Method::DELETE,
        "/api/containers/scratch?force=true",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = request(&app.router, Method::GET, "/api/containers").await;
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_container_logs_default_tail() {
    let app = test_app();
    let (status, json) = request(&app.router, Method::GET, "/api/containers/scratch/logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["logs"], "scratch tail=100\n");
}

#[tokio::test]
async fn test_runtime_unreachable_is_503() {
    let app = test_app();
    app.runtime.set_unreachable(true);
    let (status, json) = request(&app.router, Method::GET, "/api/services").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("Docker daemon"));
}

#[tokio::test]
async fn test_system_summary() {
    let app = test_app();
    let (status, json) = request(&app.router, Method::GET, "/api/system").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["runtime"], "docker");
    assert_eq!(json["containers_running"], 2);
    assert_eq!(json["containers_total"], 3);
    assert_eq!(json["services"]["services"], 3);
    assert_eq!(json["services"]["running"], 1);
    assert_eq!(json["services"]["missing"], 2);
}

#[tokio::test]
async fn test_relay_snapshot() {
    let app = test_app();
    let (session, _rx) = app.relay.connect().await;
    app.relay.subscribe_containers(session).await;
    app.relay.subscribe_stats(session, "postgres-id").await;

    let (status, json) = request(&app.router, Method::GET, "/api/relay").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sessions"], 1);
    assert_eq!(json["cycles"][0]["key"], "containers");
    assert_eq!(json["cycles"][1]["key"], "stats:postgres-id");
    assert_eq!(json["cycles"][1]["subscribers"], 1);

    app.relay.disconnect(session).await;
    let (_, json) = request(&app.router, Method::GET, "/api/relay").await;
    assert_eq!(json["sessions"], 0);
    assert!(json["cycles"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    let app = test_app();
    let response = send(&app.router, Method::GET, "/api/ws").await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_route() {
    let app = test_app();
    let response = send(&app.router, Method::GET, "/api/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
