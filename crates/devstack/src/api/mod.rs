//! HTTP API module.
//!
//! REST pass-throughs to the container runtime plus the relay WebSocket.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{
    Action, ActionResponse, HealthResponse, LogsResponse, ServiceActionResponse, SystemResponse,
};
pub use routes::create_router;
pub use state::AppState;
