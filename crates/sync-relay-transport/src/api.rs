//! Control API exercised by callers (editor extension, GUI shell).
//!
//! Every endpoint is a thin mapping onto a coordinator operation; payload
//! interpretation stays with the agents.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use sync_relay_core::{CoordinatorError, RequestCoordinator, SessionRegistry};

/// Control API state.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub coordinator: Arc<RequestCoordinator>,
}

/// Router exposing the caller-facing control endpoints.
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/agents", get(list_agents))
        .route("/api/agents/{session_id}/file_tree", get(file_tree))
        .route("/api/agents/{session_id}/file_content", post(file_content))
        .route("/api/agents/{session_id}/update_files", post(update_files))
        .with_state(state)
}

fn error_response(err: &CoordinatorError) -> (StatusCode, Json<Value>) {
    let status = match err {
        CoordinatorError::UnknownSession(_) => StatusCode::NOT_FOUND,
        CoordinatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        CoordinatorError::Shutdown => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

async fn list_agents(State(state): State<ApiState>) -> Json<Value> {
    let agents: Vec<Value> = state
        .registry
        .list_active()
        .into_iter()
        .map(|(session_id, name)| json!({ "session_id": session_id, "name": name }))
        .collect();
    Json(json!(agents))
}

async fn file_tree(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state
        .coordinator
        .issue_request(&session_id, "get_file_tree", json!({}), None)
        .await
    {
        Ok(payload) => (StatusCode::OK, Json(payload)),
        Err(err) => error_response(&err),
    }
}

#[derive(Deserialize)]
struct FileContentBody {
    paths: Vec<String>,
}

async fn file_content(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<FileContentBody>,
) -> (StatusCode, Json<Value>) {
    match state
        .coordinator
        .issue_request(
            &session_id,
            "get_file_content",
            json!({ "paths": body.paths }),
            None,
        )
        .await
    {
        Ok(payload) => (StatusCode::OK, Json(payload)),
        Err(err) => error_response(&err),
    }
}

#[derive(Deserialize)]
struct UpdateFilesBody {
    files: Vec<Value>,
}

/// Fire-and-forget: the agent applies the files, nobody waits on a reply.
async fn update_files(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<UpdateFilesBody>,
) -> (StatusCode, Json<Value>) {
    let count = body.files.len();
    match state
        .coordinator
        .push_command(&session_id, "update_files", json!({ "files": body.files }))
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "queued", "files_sent": count })),
        ),
        Err(err) => error_response(&err),
    }
}
