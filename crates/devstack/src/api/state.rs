//! Application state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::Catalog;
use crate::container::ContainerRuntimeApi;
use crate::ws::RelayHub;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Docker or Podman CLI wrapper.
    pub runtime: Arc<dyn ContainerRuntimeApi>,
    /// Read-only service catalog.
    pub catalog: Arc<Catalog>,
    /// Real-time status relay.
    pub relay: Arc<RelayHub>,
    /// Origins allowed by CORS. Empty means localhost dev origins only.
    pub allowed_origins: Arc<Vec<String>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        runtime: Arc<dyn ContainerRuntimeApi>,
        catalog: Arc<Catalog>,
        relay: Arc<RelayHub>,
    ) -> Self {
        Self {
            runtime,
            catalog,
            relay,
            allowed_origins: Arc::new(Vec::new()),
            started_at: Utc::now(),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Arc::new(origins);
        self
    }
}
