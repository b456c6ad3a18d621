//! Registry of reachable agent sessions, with identity takeover.

use std::{collections::HashMap, sync::Mutex};

use crate::session::{AgentIdentity, Session, SessionId, TransportKind};

struct Inner {
    sessions: HashMap<SessionId, Session>,
    /// Secondary index for collision detection: display name -> session id.
    by_name: HashMap<String, SessionId>,
}

/// Authoritative map of connected/reachable agents.
///
/// All operations take a single registry-wide lock, perform O(1) map work
/// and never touch I/O, so contention stays negligible.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                by_name: HashMap::new(),
            }),
        }
    }

    /// Insert a new session in unregistered state.
    ///
    /// Re-adding an existing id overwrites it (transport reconnect case).
    pub fn add_session(&self, id: impl Into<SessionId>, transport: TransportKind) {
        let id = id.into();
        let mut inner = self.inner.lock().unwrap();
        tracing::info!(session_id = %id, ?transport, "session connected, awaiting registration");
        inner
            .sessions
            .insert(id.clone(), Session::new(id, transport));
    }

    /// Remove a session and, when safe, its identity-index entry.
    ///
    /// The index entry is deleted only if it still names the removing
    /// session; a late disconnect of an evicted session must not delete the
    /// entry now pointing at its successor.
    pub fn remove_session(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.sessions.remove(id) else {
            tracing::warn!(session_id = %id, "removal of unknown session ignored");
            return;
        };
        if let Some(name) = session.display_name() {
            if inner.by_name.get(name).is_some_and(|owner| owner == id) {
                let name = name.to_owned();
                inner.by_name.remove(&name);
            }
        }
        tracing::info!(
            session_id = %id,
            name = session.display_name().unwrap_or("<unregistered>"),
            "session removed"
        );
    }

    /// Bind an agent-declared identity to an existing session.
    ///
    /// If another live session already holds `display_name`, that session is
    /// marked evicted and its id is returned so the transport can forcibly
    /// disconnect it; the index is repointed at the new session. A missing
    /// session or an empty name makes the registration a logged no-op.
    pub fn register_identity(
        &self,
        id: &str,
        display_name: &str,
        root_label: &str,
    ) -> Option<SessionId> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.sessions.contains_key(id) {
            tracing::warn!(session_id = %id, "registration from unknown session ignored");
            return None;
        }
        if display_name.is_empty() {
            tracing::warn!(session_id = %id, "registration without identity ignored");
            return None;
        }

        // A session rebinding to a new name frees its previous one; a stale
        // entry would later evict whoever legitimately claims that name.
        let previous = inner
            .sessions
            .get(id)
            .and_then(|s| s.display_name().map(str::to_owned));
        if let Some(previous) = previous {
            if previous != display_name
                && inner.by_name.get(&previous).is_some_and(|owner| owner == id)
            {
                inner.by_name.remove(&previous);
            }
        }

        let mut evicted: Option<SessionId> = None;
        if let Some(old_id) = inner.by_name.get(display_name).cloned() {
            if old_id != id {
                tracing::warn!(
                    name = %display_name,
                    old_session = %old_id,
                    new_session = %id,
                    "identity conflict, new session takes over"
                );
                if let Some(old) = inner.sessions.get_mut(&old_id) {
                    old.evicted = true;
                }
                evicted = Some(old_id);
            }
        }

        let session = inner
            .sessions
            .get_mut(id)
            .unwrap_or_else(|| unreachable!("presence checked above"));
        session.identity = Some(AgentIdentity {
            display_name: display_name.to_owned(),
            root_label: root_label.to_owned(),
        });
        session.evicted = false;
        inner
            .by_name
            .insert(display_name.to_owned(), id.to_owned());

        tracing::info!(session_id = %id, name = %display_name, root = %root_label, "session registered");
        evicted
    }

    /// Whether a session with this id is currently tracked.
    #[must_use]
    pub fn is_reachable(&self, id: &str) -> bool {
        self.inner.lock().unwrap().sessions.contains_key(id)
    }

    /// Immutable snapshot of a session's metadata.
    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<Session> {
        self.inner.lock().unwrap().sessions.get(id).cloned()
    }

    /// Registered, non-evicted sessions as `(id, display_name)` pairs,
    /// ordered by display name.
    #[must_use]
    pub fn list_active(&self) -> Vec<(SessionId, String)> {
        let inner = self.inner.lock().unwrap();
        let mut active: Vec<(SessionId, String)> = inner
            .sessions
            .values()
            .filter(|s| s.is_active())
            .map(|s| {
                (
                    s.id.clone(),
                    s.display_name().unwrap_or_default().to_owned(),
                )
            })
            .collect();
        active.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(sessions: &[(&str, TransportKind)]) -> SessionRegistry {
        let registry = SessionRegistry::new();
        for (id, transport) in sessions {
            registry.add_session(*id, *transport);
        }
        registry
    }

    #[test]
    fn register_binds_identity() {
        let registry = registry_with(&[("s1", TransportKind::Push)]);
        assert!(registry.register_identity("s1", "laptop-1", "project").is_none());

        let meta = registry.metadata("s1").unwrap();
        assert_eq!(meta.display_name(), Some("laptop-1"));
        assert_eq!(meta.identity.unwrap().root_label, "project");
        assert!(!meta.evicted);
    }

    #[test]
    fn takeover_evicts_older_session() {
        let registry = registry_with(&[("a", TransportKind::Push), ("b", TransportKind::Push)]);
        assert!(registry.register_identity("a", "laptop-1", "project").is_none());

        let evicted = registry.register_identity("b", "laptop-1", "project");
        assert_eq!(evicted.as_deref(), Some("a"));
        assert!(registry.metadata("a").unwrap().evicted);
        assert!(!registry.metadata("b").unwrap().evicted);

        let active = registry.list_active();
        assert_eq!(active, vec![("b".to_owned(), "laptop-1".to_owned())]);
    }

    #[test]
    fn late_disconnect_of_evicted_session_keeps_index() {
        let registry = registry_with(&[("a", TransportKind::Push), ("b", TransportKind::Push)]);
        registry.register_identity("a", "laptop-1", "project");
        registry.register_identity("b", "laptop-1", "project");

        // The evicted session disconnects after takeover already happened.
        registry.remove_session("a");

        let active = registry.list_active();
        assert_eq!(active, vec![("b".to_owned(), "laptop-1".to_owned())]);
    }

    #[test]
    fn disconnect_then_takeover_converges() {
        let registry = registry_with(&[("a", TransportKind::Push)]);
        registry.register_identity("a", "laptop-1", "project");
        registry.remove_session("a");

        registry.add_session("b", TransportKind::Pull);
        // Name is free again, no eviction.
        assert!(registry.register_identity("b", "laptop-1", "project").is_none());
        assert_eq!(
            registry.list_active(),
            vec![("b".to_owned(), "laptop-1".to_owned())]
        );
    }

    #[test]
    fn re_registering_same_session_is_not_a_conflict() {
        let registry = registry_with(&[("a", TransportKind::Pull)]);
        registry.register_identity("a", "laptop-1", "project");
        assert!(registry.register_identity("a", "laptop-1", "other").is_none());
        assert_eq!(
            registry.metadata("a").unwrap().identity.unwrap().root_label,
            "other"
        );
    }

    #[test]
    fn rebinding_to_a_new_name_frees_the_old_one() {
        let registry = registry_with(&[("a", TransportKind::Push), ("b", TransportKind::Push)]);
        registry.register_identity("a", "name-1", "project");
        registry.register_identity("a", "name-2", "project");

        // "name-1" is free again; claiming it must not evict "a".
        assert!(registry.register_identity("b", "name-1", "project").is_none());
        assert!(!registry.metadata("a").unwrap().evicted);
        assert_eq!(
            registry.list_active(),
            vec![
                ("b".to_owned(), "name-1".to_owned()),
                ("a".to_owned(), "name-2".to_owned()),
            ]
        );
    }

    #[test]
    fn malformed_registration_is_ignored() {
        let registry = registry_with(&[("a", TransportKind::Push)]);
        assert!(registry.register_identity("a", "", "project").is_none());
        assert!(registry.metadata("a").unwrap().identity.is_none());
        assert!(registry.list_active().is_empty());

        // Unknown session id never panics and has no side effects.
        assert!(registry.register_identity("ghost", "laptop-1", "project").is_none());
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn unregistered_and_evicted_sessions_are_not_listed() {
        let registry = registry_with(&[
            ("pending", TransportKind::Push),
            ("a", TransportKind::Push),
            ("b", TransportKind::Pull),
        ]);
        registry.register_identity("a", "host-a", "project");
        registry.register_identity("b", "host-b", "project");

        let active = registry.list_active();
        assert_eq!(
            active,
            vec![
                ("a".to_owned(), "host-a".to_owned()),
                ("b".to_owned(), "host-b".to_owned()),
            ]
        );
    }

    #[test]
    fn readd_resets_session_state() {
        let registry = registry_with(&[("a", TransportKind::Push)]);
        registry.register_identity("a", "laptop-1", "project");

        // Transport reconnect reuses the id; state starts over.
        registry.add_session("a", TransportKind::Pull);
        let meta = registry.metadata("a").unwrap();
        assert_eq!(meta.transport, TransportKind::Pull);
        assert!(meta.identity.is_none());
    }

    #[test]
    fn remove_unknown_session_is_a_noop() {
        let registry = SessionRegistry::new();
        registry.remove_session("nope");
        assert!(!registry.is_reachable("nope"));
    }
}
