//! Keyed session registry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use replay_core::SessionKey;

use super::Session;

/// Process-wide map of live sessions.
///
/// `get_or_create` is guarded by one lock so two concurrent requests for
/// the same key can never race a duplicate session (and, downstream, a
/// duplicate pipeline run) into existence.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `key`, creating it on first request. `refresh`
    /// destroys any existing session and starts over. Returns the session
    /// and whether this call created it.
    pub fn get_or_create(&self, key: SessionKey, refresh: bool) -> (Arc<Session>, bool) {
        let mut sessions = self.sessions.lock();

        if refresh && sessions.remove(&key).is_some() {
            info!(key = %key, "Session destroyed for refresh");
        }

        match sessions.get(&key) {
            Some(session) => (Arc::clone(session), false),
            None => {
                let session = Session::new(key);
                sessions.insert(key, Arc::clone(&session));
                info!(key = %key, "Session created");
                (session, true)
            }
        }
    }

    /// Lookup without creating; channel handlers use this so an unknown
    /// id stays an error instead of spawning a load.
    pub fn get(&self, key: SessionKey) -> Option<Arc<Session>> {
        self.sessions.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::SessionType;

    fn key() -> SessionKey {
        SessionKey::new(2024, 6, SessionType::Race)
    }

    #[test]
    fn get_or_create_is_idempotent_by_key() {
        let registry = SessionRegistry::new();
        let (first, created_first) = registry.get_or_create(key(), false);
        let (second, created_second) = registry.get_or_create(key(), false);

        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn refresh_recreates_the_session() {
        let registry = SessionRegistry::new();
        let (first, _) = registry.get_or_create(key(), false);
        let (second, created) = registry.get_or_create(key(), true);

        assert!(created);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn get_does_not_create() {
        let registry = SessionRegistry::new();
        assert!(registry.get(key()).is_none());
        assert!(registry.is_empty());

        registry.get_or_create(key(), false);
        assert!(registry.get(key()).is_some());
    }
}
