//! Messages resent on every fresh connection to re-establish subscriptions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};

use crate::{
    envelope::Envelope,
    error::{StreamError, StreamResult},
    types::ReplayKey,
};

struct ReplayEntry {
    seq: u64,
    payload: Value,
}

/// Store of replay envelopes, one per `(message type, id)`.
#[derive(Default)]
pub struct ReplayRegistry {
    entries: scc::HashMap<ReplayKey, ReplayEntry>,
    next_seq: AtomicU64,
}

impl ReplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the payload to replay for `(message_type, id)`.
    ///
    /// `payload.id` is overwritten with `id`, so the replayed message always
    /// targets the key it is stored under.
    pub fn register(
        &self,
        message_type: impl Into<String>,
        id: impl Into<String>,
        mut payload: Map<String, Value>,
    ) -> StreamResult<()> {
        let key = ReplayKey::new(message_type, id);
        payload.insert("id".to_string(), Value::String(key.id.clone()));

        let entry = ReplayEntry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            payload: Value::Object(payload),
        };
        if let Err((key, _)) = self.entries.insert_sync(key, entry) {
            return Err(StreamError::duplicate_key(key.message_type, key.id));
        }
        Ok(())
    }

    /// Remove the entry for `(message_type, id)`.
    pub fn unregister(&self, message_type: &str, id: &str) -> StreamResult<()> {
        let key = ReplayKey::new(message_type, id);
        match self.entries.remove_sync(&key) {
            Some(_) => Ok(()),
            None => Err(StreamError::not_found(key.to_string())),
        }
    }

    pub fn contains(&self, message_type: &str, id: &str) -> bool {
        self.entries
            .update_sync(&ReplayKey::new(message_type, id), |_, _| ())
            .is_some()
    }

    /// Every live entry as an envelope, in registration order.
    pub fn snapshot(&self) -> Vec<Envelope> {
        let mut entries = Vec::with_capacity(self.entries.len());
        self.entries.retain_sync(|key, entry| {
            entries.push((
                entry.seq,
                Envelope::new(key.message_type.clone(), entry.payload.clone()),
            ));
            true
        });
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, envelope)| envelope).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
