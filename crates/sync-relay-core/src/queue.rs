//! Store-and-forward mailbox for polling agents.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use crate::{envelope::CommandEnvelope, session::SessionId};

/// Commands kept per session before the queue starts shedding its oldest
/// entries. A polling agent that never comes back must not grow the queue
/// without bound.
pub const MAX_QUEUED_COMMANDS: usize = 1024;

/// Per-session FIFO of not-yet-delivered commands.
///
/// Owned exclusively by the `RequestCoordinator`; queues are created lazily
/// and drained whole on each poll.
pub struct OutboundQueue {
    queues: Mutex<HashMap<SessionId, VecDeque<CommandEnvelope>>>,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    /// Create an empty queue set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Append an envelope to a session's queue, creating it on first use.
    ///
    /// At `MAX_QUEUED_COMMANDS` the oldest entry is dropped with a warning;
    /// its caller, if any, times out the same way as with a lost response.
    pub fn enqueue(&self, session_id: &str, envelope: CommandEnvelope) {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.entry(session_id.to_owned()).or_default();
        while queue.len() >= MAX_QUEUED_COMMANDS {
            if let Some(dropped) = queue.pop_front() {
                tracing::warn!(
                    session_id = %session_id,
                    command = %dropped.command,
                    correlation_id = %dropped.correlation_id,
                    "outbound queue full, dropping oldest command"
                );
            }
        }
        queue.push_back(envelope);
    }

    /// Atomically remove and return everything queued for a session, in
    /// enqueue order. Unknown or empty sessions yield an empty vec.
    #[must_use]
    pub fn drain(&self, session_id: &str) -> Vec<CommandEnvelope> {
        let mut queues = self.queues.lock().unwrap();
        queues
            .get_mut(session_id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Drop a session's queue entirely, commands included. Disconnect hook.
    pub fn remove(&self, session_id: &str) {
        let mut queues = self.queues.lock().unwrap();
        if let Some(queue) = queues.remove(session_id) {
            if !queue.is_empty() {
                tracing::debug!(
                    session_id = %session_id,
                    discarded = queue.len(),
                    "discarding undelivered commands for departed session"
                );
            }
        }
    }
}
