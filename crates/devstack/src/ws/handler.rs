//! WebSocket handler for dashboard connections.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};

use crate::api::AppState;
use crate::container::validate_container_id_or_name;

use super::hub::RelayHub;
use super::types::{SessionId, WsCommand, WsEvent};

/// WebSocket upgrade handler.
///
/// GET /api/ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.relay.clone();
    ws.on_upgrade(move |socket| handle_ws_connection(socket, hub))
}

/// Drive one connection until either side closes it.
async fn handle_ws_connection(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (session_id, mut event_rx) = hub.connect().await;
    let ping_period = hub.ping_interval();

    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_period);
        // The first tick fires immediately.
        ping_interval.tick().await;

        loop {
            let event = tokio::select! {
                maybe = event_rx.recv() => match maybe {
                    Some(event) => event,
                    None => break,
                },
                _ = ping_interval.tick() => WsEvent::Ping,
            };

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize event for session {}: {}", session_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text(&hub, session_id, text.as_str()).await;
            }
            Ok(Message::Binary(_)) => {
                debug!("Binary frame from session {} ignored", session_id);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("Session {} closed the connection", session_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error for session {}: {}", session_id, e);
                break;
            }
        }
    }

    // Every exit path lands here, so no subscription outlives the socket.
    hub.disconnect(session_id).await;
    send_task.abort();
}

/// Parse and apply one text frame. Failures are reported to the sender only.
async fn handle_text(hub: &RelayHub, session_id: SessionId, text: &str) {
    let result = match serde_json::from_str::<WsCommand>(text) {
        Ok(cmd) => handle_command(hub, session_id, cmd).await,
        Err(e) => Err(anyhow::anyhow!("Invalid command: {e}")),
    };

    if let Err(e) = result {
        warn!("Command from session {} rejected: {}", session_id, e);
        hub.send_to(
            session_id,
            WsEvent::Error {
                message: e.to_string(),
            },
        )
        .await;
    }
}

/// Apply a parsed command to the relay.
pub(crate) async fn handle_command(
    hub: &RelayHub,
    session_id: SessionId,
    cmd: WsCommand,
) -> anyhow::Result<()> {
    match cmd {
        WsCommand::Pong => {}
        WsCommand::SubscribeContainers => {
            hub.subscribe_containers(session_id).await;
        }
        WsCommand::UnsubscribeContainers => {
            hub.unsubscribe_containers(session_id).await;
        }
        WsCommand::SubscribeStats { container_id } => {
            let container_id = require_container_id(&container_id)?;
            hub.subscribe_stats(session_id, container_id).await;
        }
        WsCommand::UnsubscribeStats { container_id } => {
            let container_id = require_container_id(&container_id)?;
            hub.unsubscribe_stats(session_id, container_id).await;
        }
    }
    Ok(())
}

/// Ids that the runtime would reject never reach the multiplexer.
fn require_container_id(container_id: &str) -> anyhow::Result<&str> {
    let trimmed = container_id.trim();
    if trimmed.is_empty() {
        anyhow::bail!("containerId is required");
    }
    validate_container_id_or_name(trimmed)
        .map_err(|e| anyhow::anyhow!("Invalid containerId: {e}"))?;
    Ok(trimmed)
}
