//! Correlated request/response exchange, transport-agnostic.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{
    envelope::CommandEnvelope,
    queue::OutboundQueue,
    registry::SessionRegistry,
    session::{SessionId, TransportKind},
    traits::PushDelivery,
};

/// Coordinator error.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Session not found: {0}")]
    UnknownSession(SessionId),
    #[error("Agent {session_id} did not answer '{command}' within {timeout:?}")]
    Timeout {
        session_id: SessionId,
        command: String,
        timeout: Duration,
    },
    #[error("Coordinator torn down while waiting for a response")]
    Shutdown,
}

impl CoordinatorError {
    /// Timeouts are expected outcomes; callers often branch on them.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Tunables for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Public base URL reply addresses are built from.
    pub public_base_url: String,
    /// Path prefix of the out-of-band response endpoint.
    pub reply_path_prefix: String,
    /// Wait applied when `issue_request` is called without a timeout.
    pub default_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:6032".to_owned(),
            reply_path_prefix: "/v2/respond".to_owned(),
            default_timeout: Duration::from_secs(60),
        }
    }
}

/// Removes a pending slot when the waiting side is done with it, however
/// it finishes: resolved, timed out, or cancelled. Removal happens under
/// the pending lock, so a concurrent `deliver_response` either took the
/// slot first or finds it gone; there is no third outcome.
struct PendingSlot<'a> {
    pending: &'a Mutex<HashMap<String, oneshot::Sender<Value>>>,
    correlation_id: String,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().unwrap().remove(&self.correlation_id);
    }
}

/// Orchestrates correlated exchanges with agents over either transport.
///
/// Correlation ids are generated here and only here; callers never supply
/// one, so unrelated exchanges cannot collide or spoof each other. Each
/// pending exchange is a single-assignment slot: the first resolution wins
/// and every later attempt is a logged no-op.
pub struct RequestCoordinator {
    registry: Arc<SessionRegistry>,
    push: Arc<dyn PushDelivery>,
    outbound: OutboundQueue,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    config: CoordinatorConfig,
}

impl RequestCoordinator {
    /// Create a coordinator over a registry and a push transport capability.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        push: Arc<dyn PushDelivery>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            push,
            outbound: OutboundQueue::new(),
            pending: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Send a command to an agent and wait for its correlated response.
    ///
    /// Suspends only the calling task; exchanges with other sessions (and
    /// other exchanges with the same session) proceed independently. A
    /// response that lands after the deadline is logged and dropped.
    ///
    /// # Errors
    /// `UnknownSession` if the registry does not track `session_id`;
    /// `Timeout` if no response arrives before the deadline.
    pub async fn issue_request(
        &self,
        session_id: &str,
        command: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, CoordinatorError> {
        let session = self
            .registry
            .metadata(session_id)
            .ok_or_else(|| CoordinatorError::UnknownSession(session_id.to_owned()))?;

        let correlation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(correlation_id.clone(), tx);
        // Every exit releases the slot, including the calling future being
        // dropped mid-wait (an HTTP caller hanging up cancels its handler).
        let _slot = PendingSlot {
            pending: &self.pending,
            correlation_id: correlation_id.clone(),
        };

        tracing::info!(
            session_id = %session_id,
            command = %command,
            correlation_id = %correlation_id,
            transport = ?session.transport,
            "issuing request"
        );

        let envelope = CommandEnvelope::new(command, correlation_id.clone(), payload);
        match session.transport {
            TransportKind::Pull => {
                let envelope = envelope
                    .with_reply_address(self.reply_address(session_id, &correlation_id));
                self.outbound.enqueue(session_id, envelope);
            }
            TransportKind::Push => {
                if let Err(e) = self.push.deliver(session_id, envelope).await {
                    // The slot stays; the caller observes this as a timeout.
                    tracing::warn!(
                        session_id = %session_id,
                        correlation_id = %correlation_id,
                        "push delivery failed: {e}"
                    );
                }
            }
        }

        let wait = timeout.unwrap_or(self.config.default_timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CoordinatorError::Shutdown),
            Err(_) => {
                tracing::error!(
                    session_id = %session_id,
                    command = %command,
                    correlation_id = %correlation_id,
                    "no response within {wait:?}"
                );
                Err(CoordinatorError::Timeout {
                    session_id: session_id.to_owned(),
                    command: command.to_owned(),
                    timeout: wait,
                })
            }
        }
    }

    /// Resolve the pending exchange matching `correlation_id`.
    ///
    /// Resolution is keyed purely by correlation id; `session_id` is kept
    /// for the log line, since reply addresses already scope the exchange.
    /// A stale, duplicate or forged id is logged and dropped, never an error.
    pub fn deliver_response(&self, session_id: &str, correlation_id: &str, payload: Value) {
        let slot = self.pending.lock().unwrap().remove(correlation_id);
        match slot {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    tracing::warn!(
                        session_id = %session_id,
                        correlation_id = %correlation_id,
                        "caller stopped waiting before the response arrived"
                    );
                }
            }
            None => {
                tracing::warn!(
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    "response for unknown or expired correlation id dropped"
                );
            }
        }
    }

    /// Fire-and-forget command, no response expected.
    ///
    /// # Errors
    /// `UnknownSession` if the registry does not track `session_id`.
    pub async fn push_command(
        &self,
        session_id: &str,
        command: &str,
        payload: Value,
    ) -> Result<(), CoordinatorError> {
        let session = self
            .registry
            .metadata(session_id)
            .ok_or_else(|| CoordinatorError::UnknownSession(session_id.to_owned()))?;

        let envelope = CommandEnvelope::new(command, Uuid::new_v4().to_string(), payload);
        match session.transport {
            TransportKind::Pull => {
                self.outbound.enqueue(session_id, envelope);
                tracing::info!(session_id = %session_id, command = %command, "command queued for poll");
            }
            TransportKind::Push => {
                if let Err(e) = self.push.deliver(session_id, envelope).await {
                    tracing::warn!(session_id = %session_id, command = %command, "push delivery failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// Atomically take everything queued for a polling session, FIFO.
    /// Unknown or push sessions yield an empty vec, never an error.
    #[must_use]
    pub fn drain_outbound(&self, session_id: &str) -> Vec<CommandEnvelope> {
        self.outbound.drain(session_id)
    }

    /// Locator a polling agent posts its response to. Pure; encodes
    /// `(session_id, correlation_id)` and nothing else.
    #[must_use]
    pub fn reply_address(&self, session_id: &str, correlation_id: &str) -> String {
        format!(
            "{}{}/{session_id}/{correlation_id}",
            self.config.public_base_url.trim_end_matches('/'),
            self.config.reply_path_prefix.trim_end_matches('/'),
        )
    }

    /// Number of exchanges currently awaiting a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Disconnect hook: discard undelivered commands for a departed session.
    /// Its in-flight exchanges are left to time out on their own.
    pub fn abandon_session(&self, session_id: &str) {
        self.outbound.remove(session_id);
    }
}
