use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::session::{ChannelId, Session};

/// Live sessions keyed by channel.
///
/// The connection task owns each [`Session`]; the registry only keeps a weak
/// reference for lookup, so a dropped session can never be resurrected here.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<ChannelId, Weak<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel_id: ChannelId, session: &Arc<Session>) {
        self.sessions.insert(channel_id, Arc::downgrade(session));
    }

    pub fn lookup(&self, channel_id: ChannelId) -> Option<Arc<Session>> {
        self.sessions
            .get(&channel_id)
            .and_then(|entry| entry.value().upgrade())
    }

    /// Returns whether an entry was present.
    pub fn unregister(&self, channel_id: ChannelId) -> bool {
        self.sessions.remove(&channel_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Display names of sessions that have joined with one.
    pub fn names(&self) -> Vec<String> {
        // Upgrade under the shard guard, read names after it is released.
        let live: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        live.iter().filter_map(|session| session.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutboundChannel;
    use crate::engine::{MemoryEngine, MemoryEngineOptions};

    fn session() -> Arc<Session> {
        let channel_id = ChannelId::new();
        let (engine, _parts) = MemoryEngine::new(channel_id, MemoryEngineOptions::default());
        let (outbound, _rx) = OutboundChannel::new(channel_id);
        Arc::new(Session::new(channel_id, None, Box::new(engine), outbound))
    }

    #[test_timeout::timeout]
    fn lookup_of_absent_key_is_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup(ChannelId::new()).is_none());
        assert!(!registry.unregister(ChannelId::new()));
        assert!(registry.is_empty());
    }

    #[test_timeout::timeout]
    fn register_lookup_unregister() {
        let registry = SessionRegistry::new();
        let session = session();
        let id = session.channel_id();

        registry.register(id, &session);
        let found = registry.lookup(id).expect("session registered");
        assert_eq!(found.channel_id(), id);
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(id));
        assert!(registry.lookup(id).is_none());
        assert!(registry.is_empty());
    }

    #[test_timeout::timeout]
    fn registry_does_not_own_sessions() {
        let registry = SessionRegistry::new();
        let session = session();
        let id = session.channel_id();
        registry.register(id, &session);

        drop(session);
        assert!(registry.lookup(id).is_none());
    }

    #[test_timeout::timeout]
    fn names_skip_anonymous_sessions() {
        let registry = SessionRegistry::new();
        let alice = session();
        alice.set_name(Some("alice".into()));
        let anonymous = session();
        registry.register(alice.channel_id(), &alice);
        registry.register(anonymous.channel_id(), &anonymous);

        assert_eq!(registry.names(), vec!["alice".to_string()]);
    }

    #[test_timeout::timeout]
    fn concurrent_register_and_unregister() {
        let registry = SessionRegistry::new();
        let sessions: Vec<Arc<Session>> = (0..64).map(|_| session()).collect();

        std::thread::scope(|scope| {
            for chunk in sessions.chunks(8) {
                let registry = registry.clone();
                scope.spawn(move || {
                    for session in chunk {
                        registry.register(session.channel_id(), session);
                    }
                });
            }
        });
        assert_eq!(registry.len(), 64);

        std::thread::scope(|scope| {
            for chunk in sessions[..24].chunks(6) {
                let registry = registry.clone();
                scope.spawn(move || {
                    for session in chunk {
                        assert!(registry.unregister(session.channel_id()));
                    }
                });
            }
        });
        assert_eq!(registry.len(), 64 - 24);
    }
}
