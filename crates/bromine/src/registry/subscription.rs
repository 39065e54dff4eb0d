//! Handler registry keyed by `(event type, matcher)`.

use std::sync::Arc;

use tracing::debug;

use crate::{
    error::{StreamError, StreamResult},
    handler::EventHandler,
    types::SubscriptionKey,
};

/// A registered handler and whether dispatch may use it.
#[derive(Clone)]
pub struct SubscriptionEntry {
    pub handler: Arc<dyn EventHandler>,
    pub active: bool,
}

/// Lock-free store of event handlers.
///
/// At most one entry exists per [`SubscriptionKey`]. The wildcard matcher is
/// an ordinary key and obeys the same uniqueness rule.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: scc::HashMap<SubscriptionKey, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active handler under `key`.
    pub fn register(
        &self,
        key: SubscriptionKey,
        handler: Arc<dyn EventHandler>,
    ) -> StreamResult<()> {
        let entry = SubscriptionEntry {
            handler,
            active: true,
        };
        let label = key.to_string();
        if self.entries.insert_sync(key, entry).is_err() {
            return Err(StreamError::duplicate_id(label));
        }
        debug!(key = %label, "Subscription handler registered");
        Ok(())
    }

    /// Remove the handler under `key`.
    pub fn unregister(&self, key: &SubscriptionKey) -> StreamResult<()> {
        match self.entries.remove_sync(key) {
            Some(_) => Ok(()),
            None => Err(StreamError::not_found(key.to_string())),
        }
    }

    /// Handler under `key`, if registered and active.
    pub fn lookup(&self, key: &SubscriptionKey) -> Option<Arc<dyn EventHandler>> {
        self.entries
            .update_sync(key, |_, entry| entry.active.then(|| Arc::clone(&entry.handler)))
            .flatten()
    }

    /// Pause or resume dispatch to the entry under `key`.
    pub fn set_active(&self, key: &SubscriptionKey, active: bool) -> StreamResult<()> {
        self.entries
            .update_sync(key, |_, entry| entry.active = active)
            .ok_or_else(|| StreamError::not_found(key.to_string()))
    }

    /// Whether an entry exists under `key`, active or not.
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.update_sync(key, |_, _| ()).is_some()
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys = Vec::new();
        self.entries.retain_sync(|key, _| {
            keys.push(key.clone());
            true
        });
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn noop() -> Arc<dyn EventHandler> {
        Arc::new(|_: Value| async {})
    }

    #[test]
    fn register_then_unregister_restores_state() {
        let registry = SubscriptionRegistry::new();
        let existing = SubscriptionKey::exact("channel", "a");
        registry.register(existing.clone(), noop()).expect("register");

        let key = SubscriptionKey::exact("channel", "b");
        registry.register(key.clone(), noop()).expect("register");
        registry.unregister(&key).expect("unregister");

        assert_eq!(registry.keys(), vec![existing]);
        assert!(!registry.contains(&key));
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::exact("channel", "a");
        let first = noop();
        registry.register(key.clone(), Arc::clone(&first)).expect("register");

        let err = registry.register(key.clone(), noop()).unwrap_err();
        assert!(matches!(err, StreamError::DuplicateId { ref id } if id == "channel:a"));

        let found = registry.lookup(&key).expect("still registered");
        assert!(Arc::ptr_eq(&found, &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn wildcard_is_unique_too() {
        let registry = SubscriptionRegistry::new();
        registry
            .register(SubscriptionKey::wildcard("channel"), noop())
            .expect("register");
        assert!(
            registry
                .register(SubscriptionKey::wildcard("channel"), noop())
                .is_err()
        );
        registry
            .register(SubscriptionKey::wildcard("noteUpdated"), noop())
            .expect("other type is independent");
    }

    #[test]
    fn unregister_unknown_is_not_found() {
        let registry = SubscriptionRegistry::new();
        let err = registry
            .unregister(&SubscriptionKey::exact("channel", "missing"))
            .unwrap_err();
        assert!(matches!(err, StreamError::NotFound { .. }));
    }

    #[test]
    fn paused_entries_are_invisible_to_lookup() {
        let registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::exact("channel", "a");
        registry.register(key.clone(), noop()).expect("register");

        registry.set_active(&key, false).expect("pause");
        assert!(registry.lookup(&key).is_none());
        assert!(registry.contains(&key));

        registry.set_active(&key, true).expect("resume");
        assert!(registry.lookup(&key).is_some());

        assert!(
            registry
                .set_active(&SubscriptionKey::exact("channel", "zz"), false)
                .is_err()
        );
    }
}
