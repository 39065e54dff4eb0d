//! Public client facade.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::StreamConfig,
    envelope::Envelope,
    error::{StreamError, StreamResult},
    handler::{ComebackHook, EventHandler},
    runner::{ConnectionState, Engine, LifecycleEvent, Runner},
    transport::{Connector, TungsteniteConnector},
    types::{CHANNEL_EVENT, MatchKind, NOTE_UPDATED_EVENT, OutboundKind, SubscriptionKey},
};

/// Streaming client for a Misskey server.
///
/// Registrations can be made before or while [`run`](Self::run) is in
/// progress. Channel and note subscriptions are replayed on every fresh
/// connection; while running, registering one also sends the matching
/// control message right away.
///
/// Cloning is cheap and every clone drives the same client.
#[derive(Clone)]
pub struct StreamClient {
    engine: Arc<Engine>,
    connector: Arc<dyn Connector>,
    shutdown: Arc<Mutex<CancellationToken>>,
}

impl StreamClient {
    /// Create a client using the `tokio-tungstenite` transport.
    pub fn new(config: StreamConfig) -> StreamResult<Self> {
        let connector = Arc::new(TungsteniteConnector::new(&config));
        Self::with_connector(config, connector)
    }

    /// Create a client with a custom transport.
    pub fn with_connector(
        config: StreamConfig,
        connector: Arc<dyn Connector>,
    ) -> StreamResult<Self> {
        config.validate().map_err(StreamError::config)?;
        Ok(Self {
            engine: Arc::new(Engine::new(config)),
            connector,
            shutdown: Arc::new(Mutex::new(CancellationToken::new())),
        })
    }

    /// Connect to a channel, returning its subscription id.
    ///
    /// `handler` receives the `body` of every `channel` event carrying this
    /// id. A fresh UUID is used when `id` is `None`; `params` defaults to an
    /// empty object when `Null`.
    pub fn connect_channel(
        &self,
        channel: impl AsRef<str>,
        handler: impl EventHandler,
        id: Option<String>,
        params: Value,
    ) -> StreamResult<String> {
        let channel = channel.as_ref();
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let params = if params.is_null() { json!({}) } else { params };

        let mut body = Map::new();
        body.insert("channel".to_string(), Value::String(channel.to_string()));
        body.insert("id".to_string(), Value::String(id.clone()));
        body.insert("params".to_string(), params);

        self.subscribe(
            SubscriptionKey::exact(CHANNEL_EVENT, id.clone()),
            Arc::new(handler),
            OutboundKind::Connect,
            body,
        )?;
        info!(channel, id = %id, "Channel connected");
        Ok(id)
    }

    /// Disconnect the channel subscribed under `id`.
    pub fn disconnect_channel(&self, id: &str) -> StreamResult<()> {
        self.unsubscribe(
            SubscriptionKey::exact(CHANNEL_EVENT, id),
            OutboundKind::Connect,
            OutboundKind::Disconnect,
        )?;
        info!(id, "Channel disconnected");
        Ok(())
    }

    /// Capture updates on one note.
    pub fn sub_note(
        &self,
        note_id: impl Into<String>,
        handler: impl EventHandler,
    ) -> StreamResult<()> {
        let note_id = note_id.into();
        let mut body = Map::new();
        body.insert("id".to_string(), Value::String(note_id.clone()));

        self.subscribe(
            SubscriptionKey::exact(NOTE_UPDATED_EVENT, note_id.clone()),
            Arc::new(handler),
            OutboundKind::SubNote,
            body,
        )?;
        debug!(id = %note_id, "Note captured");
        Ok(())
    }

    /// Stop capturing updates on one note.
    pub fn unsub_note(&self, note_id: &str) -> StreamResult<()> {
        self.unsubscribe(
            SubscriptionKey::exact(NOTE_UPDATED_EVENT, note_id),
            OutboundKind::SubNote,
            OutboundKind::UnsubNote,
        )?;
        debug!(id = note_id, "Note released");
        Ok(())
    }

    /// Register a handler for any inbound event type.
    ///
    /// Nothing is sent to the server; use this for events the server pushes
    /// on its own, or with [`MatchKind::Wildcard`] to catch every event of
    /// a type that no exact subscription claims.
    pub fn on_event(
        &self,
        event_type: impl Into<String>,
        matcher: impl Into<MatchKind>,
        handler: impl EventHandler,
    ) -> StreamResult<()> {
        let key = SubscriptionKey::new(event_type, matcher);
        self.engine.subscriptions.register(key, Arc::new(handler))
    }

    /// Remove a handler registered with [`on_event`](Self::on_event).
    pub fn remove_event(
        &self,
        event_type: impl Into<String>,
        matcher: impl Into<MatchKind>,
    ) -> StreamResult<()> {
        let key = SubscriptionKey::new(event_type, matcher);
        self.engine.subscriptions.unregister(&key)
    }

    /// Stop dispatching to a handler without removing it.
    ///
    /// Events then fall through to the wildcard and overflow handlers.
    pub fn pause_event(
        &self,
        event_type: impl Into<String>,
        matcher: impl Into<MatchKind>,
    ) -> StreamResult<()> {
        let key = SubscriptionKey::new(event_type, matcher);
        self.engine.subscriptions.set_active(&key, false)
    }

    pub fn resume_event(
        &self,
        event_type: impl Into<String>,
        matcher: impl Into<MatchKind>,
    ) -> StreamResult<()> {
        let key = SubscriptionKey::new(event_type, matcher);
        self.engine.subscriptions.set_active(&key, true)
    }

    /// Register a hook to run after every fresh connection.
    ///
    /// Blocking hooks run one at a time, in registration order, before any
    /// event of the new connection is dispatched; if one fails, `run`
    /// returns its error. Non-blocking hooks run concurrently afterwards and
    /// their failures are only logged.
    pub fn add_comeback(
        &self,
        hook: impl ComebackHook,
        blocking: bool,
        id: Option<String>,
    ) -> StreamResult<String> {
        let id = self
            .engine
            .comebacks
            .register(Arc::new(hook), blocking, id)?;
        debug!(id = %id, blocking, "Comeback hook registered");
        Ok(id)
    }

    pub fn remove_comeback(&self, id: &str) -> StreamResult<()> {
        self.engine.comebacks.unregister(id)
    }

    /// Set the handler for events no subscription claims.
    ///
    /// It receives the whole inbound frame, not just its body.
    pub fn set_overflow_handler(&self, handler: impl EventHandler) {
        self.engine.dispatch.set_overflow(Arc::new(handler));
    }

    /// Remove the overflow handler. Returns whether one was set.
    pub fn clear_overflow_handler(&self) -> bool {
        self.engine.dispatch.clear_overflow()
    }

    /// Queue a raw message. Fails with `NotRunning` when `run` is not in
    /// progress.
    pub fn send(&self, message_type: impl Into<String>, body: Value) -> StreamResult<()> {
        self.engine.queue.push(Envelope::new(message_type, body))
    }

    /// Run the connection loop.
    ///
    /// Returns `Ok(())` after [`shutdown`](Self::shutdown), or the first
    /// unrecoverable error. Transient failures are retried internally.
    ///
    /// A [`shutdown`](Self::shutdown) requested before this call makes it
    /// return `Ok(())` right away.
    pub async fn run(&self) -> StreamResult<()> {
        let shutdown = {
            let slot = self.shutdown.lock();
            if !self.engine.queue.open() {
                return Err(StreamError::AlreadyRunning);
            }
            slot.clone()
        };
        let _guard = RunGuard {
            engine: &self.engine,
            shutdown: &self.shutdown,
        };

        Runner::new(Arc::clone(&self.engine), Arc::clone(&self.connector), shutdown)?
            .run()
            .await
    }

    /// Ask `run` to stop. It returns once every task it owns has stopped.
    ///
    /// The request stays pending until a run consumes it, so it also stops
    /// a `run` that was spawned but has not started yet.
    pub fn shutdown(&self) {
        self.shutdown.lock().cancel();
    }

    pub fn is_running(&self) -> bool {
        self.engine.queue.is_running()
    }

    /// Current connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.engine.state.subscribe()
    }

    /// Subscribe to connection lifecycle events.
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.engine.lifecycle.subscribe()
    }

    /// Register a handler plus its replay entry, then send the control
    /// message when running. Nothing stays registered on failure.
    fn subscribe(
        &self,
        key: SubscriptionKey,
        handler: Arc<dyn EventHandler>,
        kind: OutboundKind,
        body: Map<String, Value>,
    ) -> StreamResult<()> {
        let id = match &key.matcher {
            MatchKind::Exact(id) => id.clone(),
            MatchKind::Wildcard => {
                return Err(StreamError::internal("replayed subscriptions need an id"));
            }
        };

        self.engine.subscriptions.register(key.clone(), handler)?;
        if let Err(err) = self
            .engine
            .replay
            .register(kind.as_str(), id, body.clone())
        {
            let _ = self.engine.subscriptions.unregister(&key);
            return Err(err);
        }

        self.push_if_running(Envelope::new(kind.as_str(), Value::Object(body)));
        Ok(())
    }

    fn unsubscribe(
        &self,
        key: SubscriptionKey,
        replayed_as: OutboundKind,
        kind: OutboundKind,
    ) -> StreamResult<()> {
        let MatchKind::Exact(id) = &key.matcher else {
            return Err(StreamError::not_found(key.to_string()));
        };

        // Only pairs made by `subscribe`; a bare `on_event` handler is left alone.
        if !self.engine.subscriptions.contains(&key)
            || !self.engine.replay.contains(replayed_as.as_str(), id)
        {
            return Err(StreamError::not_found(id.clone()));
        }
        self.engine.replay.unregister(replayed_as.as_str(), id)?;
        let _ = self.engine.subscriptions.unregister(&key);

        self.push_if_running(Envelope::new(kind.as_str(), json!({ "id": id })));
        Ok(())
    }

    fn push_if_running(&self, message: Envelope) {
        match self.engine.queue.push(message) {
            Ok(()) => {}
            Err(StreamError::NotRunning) => {
                debug!("Not running, message will be sent by replay");
            }
            Err(err) => debug!(error = %err, "Failed to queue control message"),
        }
    }
}

/// Resets the running flag and state however `run` ends, dropped future
/// included. The spent shutdown token is replaced before the next run can
/// start.
struct RunGuard<'a> {
    engine: &'a Engine,
    shutdown: &'a Mutex<CancellationToken>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.shutdown.lock();
        *slot = CancellationToken::new();
        self.engine.queue.close();
        self.engine.set_state(ConnectionState::Idle);
    }
}
