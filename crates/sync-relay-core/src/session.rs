//! Session data model: identity and transport classification for one agent.

use serde::{Deserialize, Serialize};

/// Session identifier.
///
/// Opaque and unique per connection attempt: transport-assigned for push
/// connections, agent-declared for polling agents.
pub type SessionId = String;

/// How the agent can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent bidirectional channel; commands are delivered immediately.
    Push,
    /// Agent polls for work; commands are stored and forwarded.
    Pull,
}

/// Agent-declared identity, bound to a session on registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Logical identity (e.g. a hostname). Stable across reconnects.
    pub display_name: String,
    /// Project/root name declared by the agent. Opaque to the core.
    pub root_label: String,
}

/// One reachable agent.
///
/// A session starts unregistered (`identity` is `None`) and becomes
/// addressable by name once the agent registers. At most one non-evicted
/// session exists per `display_name` at any instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique id for this connection attempt.
    pub id: SessionId,
    /// Delivery mode for this session.
    pub transport: TransportKind,
    /// `None` until the agent registers.
    pub identity: Option<AgentIdentity>,
    /// True once a newer session claimed the same `display_name`.
    pub evicted: bool,
}

impl Session {
    /// Create a fresh, unregistered session.
    #[must_use]
    pub fn new(id: SessionId, transport: TransportKind) -> Self {
        Self {
            id,
            transport,
            identity: None,
            evicted: false,
        }
    }

    /// Display name, if the agent has registered.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.display_name.as_str())
    }

    /// Registered, non-evicted sessions are the only ones listed to callers.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.identity.is_some() && !self.evicted
    }
}
