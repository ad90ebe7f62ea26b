//! Session Registry - concurrent map of active client sessions.
//!
//! Every operation is safe to call from many connections at once. Entries are
//! sharded by `DashMap`, so touching one session never blocks another.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::session::{Session, TransportKind};

/// Registry of active sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a session.
    pub fn track(
        &self,
        id: &str,
        token: &str,
        transport: TransportKind,
        metadata: Map<String, Value>,
    ) {
        let session = Session::new(id, token, transport, metadata);
        if self.sessions.insert(id.to_string(), session).is_some() {
            warn!(session_id = %id, "Session id reused, previous session replaced");
        }
        debug!(session_id = %id, transport = %transport, "Session tracked");
    }

    /// Stop tracking a session.
    pub fn remove(&self, id: &str) -> Option<Session> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            debug!(session_id = %id, "Session removed");
        }
        removed
    }

    /// Mark activity on a session.
    ///
    /// A tool call may race a disconnect, so a missing session is not an
    /// error. Returns whether the session existed.
    pub fn touch(&self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Get a copy of a session.
    pub fn lookup(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|session| session.clone())
    }

    /// Whether a session is tracked.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// The authorization token of a session, if it has a non-empty one.
    pub fn token(&self, id: &str) -> Option<String> {
        self.sessions
            .get(id)
            .map(|session| session.auth_token.clone())
            .filter(|token| !token.is_empty())
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no active sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Active session counts per transport.
    pub fn count_by_transport(&self) -> BTreeMap<TransportKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.sessions.iter() {
            *counts.entry(entry.transport).or_insert(0) += 1;
        }
        counts
    }

    /// Remove sessions with no activity for longer than `max_idle`.
    ///
    /// Returns the removed session ids.
    pub fn expire_idle(&self, max_idle: Duration) -> Vec<String> {
        let now = Utc::now();
        let max_idle = chrono::Duration::from_std(max_idle).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.idle_for(now) > max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        // Re-check under the shard lock: a call may have touched it meanwhile.
        expired
            .into_iter()
            .filter(|id| {
                self.sessions
                    .remove_if(id, |_, session| session.idle_for(now) > max_idle)
                    .is_some()
            })
            .collect()
    }

    /// Remove every session.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_lookup() {
        let registry = SessionRegistry::new();
        registry.track("s1", "tok", TransportKind::Stream, Map::new());

        let session = registry.lookup("s1").unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.auth_token, "tok");
        assert_eq!(session.transport, TransportKind::Stream);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_touch_missing_session_is_noop() {
        let registry = SessionRegistry::new();
        assert!(!registry.touch("missing"));
        assert!(registry.is_empty());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_touch_updates_last_activity() {
        let registry = SessionRegistry::new();
        registry.track("s1", "", TransportKind::Pipe, Map::new());
        let before = registry.lookup("s1").unwrap().last_activity;

        std::thread::sleep(Duration::from_millis(5));
        assert!(registry.touch("s1"));

        let after = registry.lookup("s1").unwrap();
        assert!(after.last_activity > before);
        assert_eq!(after.connected_at, before);
    }

    #[test]
    fn test_token_empty_is_none() {
        let registry = SessionRegistry::new();
        registry.track("s1", "", TransportKind::Pipe, Map::new());
        registry.track("s2", "abc", TransportKind::Stream, Map::new());

        assert_eq!(registry.token("s1"), None);
        assert_eq!(registry.token("s2").as_deref(), Some("abc"));
        assert_eq!(registry.token("missing"), None);
    }

    #[test]
    fn test_remove() {
        let registry = SessionRegistry::new();
        registry.track("s1", "", TransportKind::Pipe, Map::new());

        assert!(registry.remove("s1").is_some());
        assert!(registry.remove("s1").is_none());
        assert!(!registry.contains("s1"));
    }

    #[test]
    fn test_count_by_transport() {
        let registry = SessionRegistry::new();
        registry.track("a", "", TransportKind::Stream, Map::new());
        registry.track("b", "", TransportKind::Stream, Map::new());
        registry.track("c", "", TransportKind::Pipe, Map::new());

        let counts = registry.count_by_transport();
        assert_eq!(counts.get(&TransportKind::Stream), Some(&2));
        assert_eq!(counts.get(&TransportKind::Pipe), Some(&1));
    }

    #[test]
    fn test_expire_idle() {
        let registry = SessionRegistry::new();
        registry.track("old", "", TransportKind::Stream, Map::new());
        std::thread::sleep(Duration::from_millis(30));
        registry.track("fresh", "", TransportKind::Stream, Map::new());

        let expired = registry.expire_idle(Duration::from_millis(15));
        assert_eq!(expired, vec!["old"]);
        assert!(registry.contains("fresh"));
        assert!(!registry.contains("old"));
    }

    #[test]
    fn test_concurrent_touch_and_remove() {
        use std::sync::Arc;

        let registry = Arc::new(SessionRegistry::new());
        for i in 0..16 {
            registry.track(&format!("s{i}"), "", TransportKind::Stream, Map::new());
        }

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let id = format!("s{i}");
                    for _ in 0..100 {
                        registry.touch(&id);
                    }
                    registry.remove(&id);
                    registry.touch(&id);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
