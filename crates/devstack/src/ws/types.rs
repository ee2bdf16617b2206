//! WebSocket message types for the status relay.
//!
//! These types define the protocol between the dashboard and the backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::{Container, ContainerStats};
use crate::status::ServiceStatus;

/// Opaque identifier of one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The addressable unit of polling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionKey {
    /// The global container list.
    ContainerList,
    /// Stats of one container.
    Stats(String),
}

impl SubscriptionKey {
    pub fn stats(container_id: impl Into<String>) -> Self {
        SubscriptionKey::Stats(container_id.into())
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::ContainerList => write!(f, "containers"),
            SubscriptionKey::Stats(id) => write!(f, "stats:{id}"),
        }
    }
}

// ============================================================================
// Events (Server -> Client)
// ============================================================================

/// Events sent from backend to a single session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    /// Channel established.
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Keepalive.
    #[serde(rename = "ping")]
    Ping,

    /// A command from this session could not be handled.
    #[serde(rename = "error")]
    Error { message: String },

    /// Full replacement container list, not a delta.
    #[serde(rename = "containers:update")]
    ContainersUpdate { containers: Vec<Container> },

    /// Aggregated service status computed from the same tick's container list.
    #[serde(rename = "services:update")]
    ServicesUpdate { services: Vec<ServiceStatus> },

    /// Stats snapshot of one container.
    #[serde(rename = "stats:update")]
    StatsUpdate {
        #[serde(rename = "containerId")]
        container_id: String,
        stats: ContainerStats,
    },
}

// ============================================================================
// Commands (Client -> Server)
// ============================================================================

/// Commands sent from the dashboard over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum WsCommand {
    /// Pong response to ping.
    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "subscribe:containers")]
    SubscribeContainers,

    #[serde(rename = "unsubscribe:containers")]
    UnsubscribeContainers,

    #[serde(rename = "subscribe:stats")]
    SubscribeStats {
        #[serde(rename = "containerId")]
        container_id: String,
    },

    #[serde(rename = "unsubscribe:stats")]
    UnsubscribeStats {
        #[serde(rename = "containerId")]
        container_id: String,
    },
}
