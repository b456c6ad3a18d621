//! Capability trait supplied by push-capable transports.

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::CommandEnvelope;

/// Push delivery error.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("No live channel for session: {0}")]
    ChannelGone(String),
    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Immediate-delivery capability of a push transport.
///
/// The coordinator calls this symmetrically with the pull path: transport
/// specifics never branch inside the coordinator beyond choosing which
/// capability to invoke.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// Deliver an envelope on the agent's dedicated channel, immediately.
    async fn deliver(
        &self,
        session_id: &str,
        envelope: CommandEnvelope,
    ) -> Result<(), DeliveryError>;

    /// Forcibly close the agent's channel. Invoked after identity takeover.
    async fn force_disconnect(&self, session_id: &str);
}
