//! Wire protocol for agent-server communication.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sync_relay_core::CommandEnvelope;

/// Message from agent to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Declare logical identity; triggers session registration.
    Register {
        identity: String,
        #[serde(default)]
        root_label: Option<String>,
    },
    /// Response to a previously issued command.
    Response {
        correlation_id: String,
        payload: Value,
    },
    /// Ping for keepalive.
    Ping,
}

/// Message from server to agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges a registration.
    Registered { session_id: String },
    /// A command to execute; carries its own correlation id.
    Command { command: CommandEnvelope },
    /// This session lost its identity to a newer connection.
    Evicted,
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}
