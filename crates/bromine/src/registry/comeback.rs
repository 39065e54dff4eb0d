//! Hooks run after every fresh connection, in registration order.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    error::{StreamError, StreamResult},
    handler::ComebackHook,
};

/// A registered comeback hook.
#[derive(Clone)]
pub struct ComebackEntry {
    pub id: String,
    /// Blocking hooks finish before the connection starts dispatching.
    pub blocking: bool,
    pub hook: Arc<dyn ComebackHook>,
}

impl fmt::Debug for ComebackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComebackEntry")
            .field("id", &self.id)
            .field("blocking", &self.blocking)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ComebackRegistry {
    entries: scc::HashMap<String, (u64, ComebackEntry)>,
    next_seq: AtomicU64,
}

impl ComebackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, returning its id (a fresh UUID when `id` is `None`).
    pub fn register(
        &self,
        hook: Arc<dyn ComebackHook>,
        blocking: bool,
        id: Option<String>,
    ) -> StreamResult<String> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let entry = ComebackEntry {
            id: id.clone(),
            blocking,
            hook,
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if self.entries.insert_sync(id.clone(), (seq, entry)).is_err() {
            return Err(StreamError::duplicate_id(id));
        }
        Ok(id)
    }

    pub fn unregister(&self, id: &str) -> StreamResult<()> {
        match self.entries.remove_sync(id) {
            Some(_) => Ok(()),
            None => Err(StreamError::not_found(id)),
        }
    }

    /// All hooks in registration order.
    pub fn snapshot(&self) -> Vec<ComebackEntry> {
        let mut entries = Vec::with_capacity(self.entries.len());
        self.entries.retain_sync(|_, (seq, entry)| {
            entries.push((*seq, entry.clone()));
            true
        });
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, entry)| entry).collect()
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
    use super::*;
    use crate::handler::HookError;

    fn hook() -> Arc<dyn ComebackHook> {
        Arc::new(|| async { Ok::<(), HookError>(()) })
    }

    #[test]
    fn generated_ids_are_unique() {
        let registry = ComebackRegistry::new();
        let a = registry.register(hook(), true, None).expect("register");
        let b = registry.register(hook(), false, None).expect("register");
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn explicit_id_collision_fails() {
        let registry = ComebackRegistry::new();
        registry
            .register(hook(), true, Some("resync".into()))
            .expect("register");
        let err = registry
            .register(hook(), false, Some("resync".into()))
            .unwrap_err();
        assert!(matches!(err, StreamError::DuplicateId { ref id } if id == "resync"));
        assert!(registry.snapshot()[0].blocking);
    }

    #[test]
    fn snapshot_is_in_registration_order() {
        let registry = ComebackRegistry::new();
        for id in ["z", "m", "a"] {
            registry
                .register(hook(), id != "m", Some(id.to_string()))
                .expect("register");
        }
        let order: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|entry| (entry.id, entry.blocking))
            .collect();
        assert_eq!(
            order,
            [
                ("z".to_string(), true),
                ("m".to_string(), false),
                ("a".to_string(), true)
            ]
        );
    }

    #[test]
    fn unregister_removes_and_reports_missing() {
        let registry = ComebackRegistry::new();
        let id = registry.register(hook(), true, None).expect("register");
        registry.unregister(&id).expect("unregister");
        assert!(registry.is_empty());
        assert!(matches!(
            registry.unregister(&id),
            Err(StreamError::NotFound { .. })
        ));
    }
}
