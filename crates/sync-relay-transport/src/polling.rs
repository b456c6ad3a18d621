//! HTTP polling (pull) transport for agents behind restrictive networks.
//!
//! A polling agent registers once, then periodically drains its command
//! queue via `/v2/check` and posts responses out-of-band to the reply
//! address carried by each command envelope.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use sync_relay_core::{PushDelivery, RequestCoordinator, SessionRegistry, TransportKind};

/// Polling route state.
#[derive(Clone)]
pub struct PollState {
    pub registry: Arc<SessionRegistry>,
    pub coordinator: Arc<RequestCoordinator>,
    /// Needed when a polling agent takes over a push session's identity.
    pub push: Arc<dyn PushDelivery>,
}

/// Router exposing the polling endpoints.
#[must_use]
pub fn router(state: PollState) -> Router {
    Router::new()
        .route("/v2/register", post(register))
        .route("/v2/disconnect", post(disconnect))
        .route("/v2/check", get(check))
        .route("/v2/respond/{session_id}/{correlation_id}", post(respond))
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterBody {
    identity: String,
    #[serde(default)]
    root_label: Option<String>,
}

/// A polling agent has no transport-assigned id, so its declared identity
/// doubles as the session id (distinct from the UUIDs given to sockets).
async fn register(
    State(state): State<PollState>,
    Json(body): Json<RegisterBody>,
) -> (StatusCode, Json<Value>) {
    if body.identity.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "'identity' is required" })),
        );
    }

    let session_id = body.identity.clone();
    let root = body.root_label.unwrap_or_else(|| "project".to_owned());
    state
        .registry
        .add_session(session_id.clone(), TransportKind::Pull);
    let evicted = state
        .registry
        .register_identity(&session_id, &body.identity, &root);

    if let Some(old) = evicted {
        tracing::warn!(
            old_session = %old,
            new_session = %session_id,
            "polling registration superseded an existing session"
        );
        state.push.force_disconnect(&old).await;
    }

    tracing::info!(session_id = %session_id, "polling agent registered");
    (StatusCode::OK, Json(json!({ "session_id": session_id })))
}

#[derive(Deserialize)]
struct DisconnectBody {
    session_id: String,
}

async fn disconnect(
    State(state): State<PollState>,
    Json(body): Json<DisconnectBody>,
) -> Json<Value> {
    state.registry.remove_session(&body.session_id);
    state.coordinator.abandon_session(&body.session_id);
    tracing::info!(session_id = %body.session_id, "polling agent disconnected");
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct CheckParams {
    session_id: String,
}

async fn check(
    State(state): State<PollState>,
    Query(params): Query<CheckParams>,
) -> (StatusCode, Json<Value>) {
    if !state.registry.is_reachable(&params.session_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown session" })),
        );
    }
    let commands = state.coordinator.drain_outbound(&params.session_id);
    (StatusCode::OK, Json(json!({ "commands": commands })))
}

#[derive(Deserialize)]
struct RespondBody {
    payload: Value,
}

/// Out-of-band response post; the path matches the envelope's reply address.
/// Stale or duplicate responses are acknowledged and dropped.
async fn respond(
    State(state): State<PollState>,
    Path((session_id, correlation_id)): Path<(String, String)>,
    Json(body): Json<RespondBody>,
) -> Json<Value> {
    state
        .coordinator
        .deliver_response(&session_id, &correlation_id, body.payload);
    Json(json!({ "status": "received" }))
}
