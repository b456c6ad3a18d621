//! Transport layer for the sync-relay coordinator.
//!
//! Provides:
//! - Wire protocol (JSON, internally tagged)
//! - WebSocket push transport for persistently connected agents
//! - HTTP polling transport for agents behind restrictive networks
//! - Control API exercised by callers (extension/GUI)

pub mod api;
pub mod polling;
pub mod protocol;
pub mod websocket;

pub use protocol::{AgentMessage, ServerMessage};
pub use websocket::WsConnections;
