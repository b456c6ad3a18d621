//! The unit of delivery between coordinator and agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One command addressed to an agent, correlated with its eventual response.
///
/// The payload is opaque to the core; only `correlation_id` matters for
/// demultiplexing the reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Command name, e.g. `get_file_tree`. Opaque to the core.
    #[serde(rename = "type")]
    pub command: String,
    /// Unique token tying this command to its response.
    pub correlation_id: String,
    /// Command arguments, passed through untouched.
    pub payload: Value,
    /// Locator a polling agent posts its response to, out of band.
    /// `None` for push sessions and for fire-and-forget commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_address: Option<String>,
}

impl CommandEnvelope {
    /// Build an envelope for a correlated exchange.
    #[must_use]
    pub fn new(command: impl Into<String>, correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            command: command.into(),
            correlation_id: correlation_id.into(),
            payload,
            reply_address: None,
        }
    }

    /// Attach the out-of-band reply locator used by pull delivery.
    #[must_use]
    pub fn with_reply_address(mut self, address: impl Into<String>) -> Self {
        self.reply_address = Some(address.into());
        self
    }
}
