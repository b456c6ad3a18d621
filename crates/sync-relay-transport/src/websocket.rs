//! WebSocket push transport for persistently connected agents.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Notify, RwLock, mpsc};
use uuid::Uuid;

use sync_relay_core::{
    CommandEnvelope, DeliveryError, PushDelivery, RequestCoordinator, SessionRegistry,
    TransportKind,
};

use crate::protocol::{AgentMessage, ServerMessage};

struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ServerMessage>,
    shutdown: Arc<Notify>,
}

/// Live push channels, keyed by session id.
///
/// Doubles as the coordinator's `PushDelivery` capability: delivery writes
/// into the connection's outgoing queue, forced disconnect wakes the socket
/// task so it tears the connection down.
#[derive(Default)]
pub struct WsConnections {
    channels: RwLock<HashMap<String, ConnectionHandle>>,
}

impl WsConnections {
    /// Create an empty connection map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(
        &self,
        session_id: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
        shutdown: Arc<Notify>,
    ) {
        self.channels
            .write()
            .await
            .insert(session_id, ConnectionHandle { tx, shutdown });
    }

    async fn remove(&self, session_id: &str) {
        self.channels.write().await.remove(session_id);
    }
}

#[async_trait]
impl PushDelivery for WsConnections {
    async fn deliver(
        &self,
        session_id: &str,
        envelope: CommandEnvelope,
    ) -> Result<(), DeliveryError> {
        let channels = self.channels.read().await;
        let handle = channels
            .get(session_id)
            .ok_or_else(|| DeliveryError::ChannelGone(session_id.to_owned()))?;
        handle
            .tx
            .send(ServerMessage::Command { command: envelope })
            .map_err(|e| DeliveryError::Failed(e.to_string()))
    }

    async fn force_disconnect(&self, session_id: &str) {
        let channels = self.channels.read().await;
        if let Some(handle) = channels.get(session_id) {
            // Best effort: tell the agent why, then close the socket task.
            let _ = handle.tx.send(ServerMessage::Evicted);
            handle.shutdown.notify_one();
        }
    }
}

/// WebSocket handler state.
#[derive(Clone)]
pub struct WsState {
    pub registry: Arc<SessionRegistry>,
    pub coordinator: Arc<RequestCoordinator>,
    pub connections: Arc<WsConnections>,
}

/// Router exposing the agent WebSocket endpoint.
#[must_use]
pub fn router(state: WsState) -> Router {
    Router::new()
        .route("/ws/agent", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let session_id = Uuid::new_v4().to_string();
    state
        .registry
        .add_session(session_id.clone(), TransportKind::Push);

    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the agent
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let shutdown = Arc::new(Notify::new());
    state
        .connections
        .insert(session_id.clone(), tx.clone(), Arc::clone(&shutdown))
        .await;

    // Spawn task to forward messages to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        let msg = tokio::select! {
            () = shutdown.notified() => break,
            msg = receiver.next() => msg,
        };
        let Some(msg) = msg else { break };

        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let agent_msg: AgentMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid agent message: {e}");
                let _ = tx.send(ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                });
                continue;
            }
        };

        match agent_msg {
            AgentMessage::Register { identity, root_label } => {
                if identity.is_empty() {
                    let _ = tx.send(ServerMessage::Error {
                        message: "registration requires a non-empty identity".to_owned(),
                    });
                    continue;
                }
                let root = root_label.unwrap_or_else(|| "project".to_owned());
                let evicted = state
                    .registry
                    .register_identity(&session_id, &identity, &root);
                let _ = tx.send(ServerMessage::Registered {
                    session_id: session_id.clone(),
                });
                if let Some(old) = evicted {
                    tracing::warn!(
                        old_session = %old,
                        new_session = %session_id,
                        "forcing disconnect of superseded session"
                    );
                    state.connections.force_disconnect(&old).await;
                }
            }
            AgentMessage::Response { correlation_id, payload } => {
                state
                    .coordinator
                    .deliver_response(&session_id, &correlation_id, payload);
            }
            AgentMessage::Ping => {
                let _ = tx.send(ServerMessage::Pong);
            }
        }
    }

    // Cleanup
    state.connections.remove(&session_id).await;
    state.registry.remove_session(&session_id);
    state.coordinator.abandon_session(&session_id);
    send_task.abort();

    tracing::info!(session_id = %session_id, "push channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn deliver_reaches_registered_channel() {
        let connections = WsConnections::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections
            .insert("s1".to_owned(), tx, Arc::new(Notify::new()))
            .await;

        let envelope = CommandEnvelope::new("get_file_tree", "corr-1", json!({}));
        connections.deliver("s1", envelope).await.unwrap();

        match rx.recv().await {
            Some(ServerMessage::Command { command }) => {
                assert_eq!(command.correlation_id, "corr-1");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deliver_to_unknown_session_is_channel_gone() {
        let connections = WsConnections::new();
        let envelope = CommandEnvelope::new("get_file_tree", "corr-1", json!({}));
        let err = connections.deliver("ghost", envelope).await.unwrap_err();
        assert!(matches!(err, DeliveryError::ChannelGone(_)));
    }

    #[tokio::test]
    async fn force_disconnect_notifies_and_warns_agent() {
        let connections = WsConnections::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        connections
            .insert("s1".to_owned(), tx, Arc::clone(&shutdown))
            .await;

        let notified = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { shutdown.notified().await })
        };
        connections.force_disconnect("s1").await;

        assert!(matches!(rx.recv().await, Some(ServerMessage::Evicted)));
        notified.await.unwrap();
    }
}
