//! Inbound event routing.
//!
//! Resolution order for an inbound frame:
//!
//! 1. the exact entry for `(type, body.id)`, when `body.id` is a string;
//! 2. the wildcard entry for `type`;
//! 3. the overflow handler, which receives the whole frame;
//! 4. nothing, and the frame is dropped.
//!
//! At most one handler fires per frame.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::{
    envelope::Inbound,
    handler::EventHandler,
    registry::SubscriptionRegistry,
    types::SubscriptionKey,
};

/// A resolved handler and the payload to hand it.
pub(crate) struct Route {
    pub(crate) handler: Arc<dyn EventHandler>,
    pub(crate) payload: Value,
}

impl Route {
    /// Run the handler to completion.
    pub(crate) async fn invoke(self) {
        self.handler.handle(self.payload).await;
    }
}

/// Routes inbound frames using the live subscription registry.
pub(crate) struct DispatchTable {
    subscriptions: Arc<SubscriptionRegistry>,
    overflow: RwLock<Option<Arc<dyn EventHandler>>>,
}

impl DispatchTable {
    pub(crate) fn new(subscriptions: Arc<SubscriptionRegistry>) -> Self {
        Self {
            subscriptions,
            overflow: RwLock::new(None),
        }
    }

    pub(crate) fn set_overflow(&self, handler: Arc<dyn EventHandler>) {
        *self.overflow.write() = Some(handler);
    }

    pub(crate) fn clear_overflow(&self) -> bool {
        self.overflow.write().take().is_some()
    }

    /// Pick the single handler for `inbound`, if any.
    pub(crate) fn resolve(&self, inbound: Inbound) -> Option<Route> {
        match inbound {
            Inbound::Event(envelope) => {
                match self.subscriber(&envelope.kind, envelope.subscription_id()) {
                    Some(handler) => Some(Route {
                        handler,
                        payload: envelope.body,
                    }),
                    None => self.overflow_route(Inbound::Event(envelope)),
                }
            }
            other => self.overflow_route(other),
        }
    }

    fn subscriber(&self, event_type: &str, id: Option<&str>) -> Option<Arc<dyn EventHandler>> {
        id.and_then(|id| {
            self.subscriptions
                .lookup(&SubscriptionKey::exact(event_type, id))
        })
        .or_else(|| {
            self.subscriptions
                .lookup(&SubscriptionKey::wildcard(event_type))
        })
    }

    fn overflow_route(&self, inbound: Inbound) -> Option<Route> {
        let handler = self.overflow.read().clone()?;
        Some(Route {
            handler,
            payload: inbound.into_value(),
        })
    }
}
