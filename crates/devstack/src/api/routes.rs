//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;
use crate::ws::ws_handler;

/// Origins allowed when none are configured.
const DEV_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
];

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api = Router::new()
        .route("/health", get(handlers::health))
        // Services
        .route("/services", get(handlers::list_services))
        .route("/services/start", post(handlers::start_all_services))
        .route("/services/stop", post(handlers::stop_all_services))
        .route("/services/{id}", get(handlers::get_service))
        .route("/services/{id}/start", post(handlers::start_service))
        .route("/services/{id}/stop", post(handlers::stop_service))
        .route("/services/{id}/restart", post(handlers::restart_service))
        .route("/services/{id}/logs", get(handlers::get_service_logs))
        // Containers
        .route("/containers", get(handlers::list_containers))
        .route("/containers/{id}", delete(handlers::remove_container))
        .route("/containers/{id}/stats", get(handlers::get_container_stats))
        .route("/containers/{id}/start", post(handlers::start_container))
        .route("/containers/{id}/stop", post(handlers::stop_container))
        .route("/containers/{id}/restart", post(handlers::restart_container))
        .route("/containers/{id}/logs", get(handlers::get_container_logs))
        // System & relay
        .route("/system", get(handlers::system))
        .route("/relay", get(handlers::relay))
        .route("/ws", get(ws_handler));

    Router::new()
        .nest("/api", api)
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN];

    let configured: &[String] = &state.allowed_origins;
    let origins: Vec<HeaderValue> = if configured.is_empty() {
        tracing::debug!("CORS: No origins configured, allowing localhost dev origins");
        DEV_ORIGINS
            .into_iter()
            .map(HeaderValue::from_static)
            .collect()
    } else {
        configured
            .iter()
            .filter_map(|origin| {
                origin.parse::<HeaderValue>().ok().or_else(|| {
                    tracing::warn!("CORS: Invalid origin in config: {}", origin);
                    None
                })
            })
            .collect()
    };

    if origins.is_empty() {
        tracing::error!("CORS: All configured origins are invalid!");
        return CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")));
    }

    tracing::info!("CORS: Allowing {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}
