//! Connection runner: the reconnect state machine.
//!
//! Each attempt opens the transport, probes it with a ping, runs the
//! comeback hooks, starts the send daemon and then receives until the
//! connection fails. Per-connection tasks are always torn down before the
//! next attempt starts or an error leaves [`Runner::run`].

use std::{convert::Infallible, sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, watch},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    config::StreamConfig,
    daemon::send_daemon,
    dispatch::DispatchTable,
    envelope::Inbound,
    error::{FailureClass, StreamError, StreamResult},
    queue::OutboundQueue,
    reconnect::CooldownPolicy,
    registry::{ComebackRegistry, ReplayRegistry, SubscriptionRegistry},
    tasks::{BackgroundTasks, ConnectionTasks, log_comeback},
    transport::{Connector, redacted},
};

/// Number of the connection, incremented on every successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionEpoch(pub u64);

/// Connection state machine states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// `run` is not in progress.
    Idle,
    /// Opening the transport and running comeback hooks.
    Connecting,
    /// Receiving and dispatching events.
    Ready,
    /// Tearing down the per-connection tasks.
    Draining,
    /// Waiting before the next attempt.
    CoolingDown {
        /// Consecutive failures so far.
        failures: u32,
        /// Total wait, penalty included.
        delay: Duration,
    },
}

/// Connection lifecycle notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    Connected {
        epoch: ConnectionEpoch,
        latency: Duration,
    },
    Disconnected {
        epoch: ConnectionEpoch,
        reason: String,
        failures: u32,
        /// `None` when the runner gives up.
        retry_in: Option<Duration>,
    },
}

/// State shared between the client facade and the runner.
pub(crate) struct Engine {
    pub(crate) config: StreamConfig,
    pub(crate) subscriptions: Arc<SubscriptionRegistry>,
    pub(crate) replay: Arc<ReplayRegistry>,
    pub(crate) comebacks: ComebackRegistry,
    pub(crate) dispatch: DispatchTable,
    pub(crate) queue: Arc<OutboundQueue>,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl Engine {
    pub(crate) fn new(config: StreamConfig) -> Self {
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (lifecycle, _) = broadcast::channel(config.lifecycle_channel_capacity);
        Self {
            dispatch: DispatchTable::new(Arc::clone(&subscriptions)),
            subscriptions,
            replay: Arc::new(ReplayRegistry::new()),
            comebacks: ComebackRegistry::new(),
            queue: Arc::new(OutboundQueue::new()),
            state,
            lifecycle,
            config,
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.lifecycle.send(event);
    }
}

pub(crate) struct Runner {
    engine: Arc<Engine>,
    connector: Arc<dyn Connector>,
    url: Url,
    policy: CooldownPolicy,
    shutdown: CancellationToken,
    failures: u32,
    epoch: ConnectionEpoch,
    background: BackgroundTasks,
}

impl Runner {
    pub(crate) fn new(
        engine: Arc<Engine>,
        connector: Arc<dyn Connector>,
        shutdown: CancellationToken,
    ) -> StreamResult<Self> {
        let url = engine.config.endpoint()?;
        let policy = engine.config.cooldown_policy();
        Ok(Self {
            engine,
            connector,
            url,
            policy,
            shutdown,
            failures: 0,
            epoch: ConnectionEpoch(0),
            background: BackgroundTasks::new(),
        })
    }

    /// Run until shutdown (`Ok`) or an unrecoverable failure (`Err`).
    pub(crate) async fn run(mut self) -> StreamResult<()> {
        info!(url = %redacted(&self.url), "Streaming client started");
        let result = self.drive().await;
        self.background.cancel_all().await;
        info!("Streaming client stopped");
        result
    }

    async fn drive(&mut self) -> StreamResult<()> {
        let shutdown = self.shutdown.clone();

        loop {
            self.engine.set_state(ConnectionState::Connecting);
            let mut tasks = ConnectionTasks::new();
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                result = self.attempt(&mut tasks) => Some(result),
            };

            self.engine.set_state(ConnectionState::Draining);
            tasks.teardown().await;

            let Some(Err(err)) = outcome else {
                info!("Shutdown requested");
                return Ok(());
            };

            match err.classify() {
                FailureClass::Unrecoverable => {
                    error!(error = %err, epoch = self.epoch.0, "Unrecoverable streaming failure");
                    self.engine.emit(LifecycleEvent::Disconnected {
                        epoch: self.epoch,
                        reason: err.to_string(),
                        failures: self.failures,
                        retry_in: None,
                    });
                    return Err(err);
                }
                FailureClass::Transient => {
                    self.failures = self.failures.saturating_add(1);
                    let delay = self.policy.delay_after(self.failures);
                    warn!(
                        error = %err,
                        failures = self.failures,
                        penalized = self.policy.penalized(self.failures),
                        retry_in_ms = delay.as_millis() as u64,
                        "Connection lost, cooling down"
                    );
                    self.engine.emit(LifecycleEvent::Disconnected {
                        epoch: self.epoch,
                        reason: err.to_string(),
                        failures: self.failures,
                        retry_in: Some(delay),
                    });
                    self.engine.set_state(ConnectionState::CoolingDown {
                        failures: self.failures,
                        delay,
                    });

                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            info!("Shutdown requested during cool-down");
                            return Ok(());
                        }
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One connection lifetime. Only returns on failure.
    async fn attempt(&mut self, tasks: &mut ConnectionTasks) -> StreamResult<Infallible> {
        let engine = Arc::clone(&self.engine);
        let config = &engine.config;

        debug!(url = %redacted(&self.url), "Opening connection");
        let mut link = timeout(config.connect_timeout, self.connector.open(&self.url))
            .await
            .map_err(|_| StreamError::timeout(config.connect_timeout))??;

        let latency = timeout(config.ping_timeout, link.ping())
            .await
            .map_err(|_| StreamError::timeout(config.ping_timeout))??;
        info!(latency_ms = latency.as_millis() as u64, "Connection alive");

        run_comebacks(&engine.comebacks, tasks).await?;

        let (sink, mut source) = link.split();
        tasks.daemon.spawn(send_daemon(
            Arc::clone(&engine.replay),
            Arc::clone(&engine.queue),
            sink,
        ));

        self.failures = 0;
        self.epoch.0 += 1;
        engine.set_state(ConnectionState::Ready);
        engine.emit(LifecycleEvent::Connected {
            epoch: self.epoch,
            latency,
        });

        loop {
            tokio::select! {
                frame = source.recv_text() => {
                    let text = frame?;
                    self.dispatch(&text);
                }
                Some(result) = tasks.daemon.join_next(), if !tasks.daemon.is_empty() => {
                    return Err(match result {
                        Ok(Ok(())) => StreamError::internal("send daemon exited"),
                        Ok(Err(err)) => err,
                        Err(err) => StreamError::internal(format!("send daemon failed: {err}")),
                    });
                }
                Some(result) = tasks.comebacks.join_next(), if !tasks.comebacks.is_empty() => {
                    log_comeback(result);
                }
            }
        }
    }

    /// Frames that are not valid JSON are logged and skipped; they never end
    /// the connection.
    fn dispatch(&mut self, text: &str) {
        let inbound = match Inbound::decode(text) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(error = %err, "Skipping malformed frame");
                return;
            }
        };

        match self.engine.dispatch.resolve(inbound) {
            Some(route) => self.background.spawn(route.invoke()),
            None => debug!("Dropping event with no handler"),
        }
    }
}

/// Await blocking hooks in order, then launch the rest as one group.
async fn run_comebacks(
    comebacks: &ComebackRegistry,
    tasks: &mut ConnectionTasks,
) -> StreamResult<()> {
    let mut deferred = Vec::new();
    for entry in comebacks.snapshot() {
        if entry.blocking {
            debug!(id = %entry.id, "Running blocking comeback hook");
            entry.hook.run().await?;
        } else {
            deferred.push(entry);
        }
    }

    for entry in deferred {
        tasks.comebacks.spawn(async move {
            let result = entry.hook.run().await;
            (entry.id, result)
        });
    }
    Ok(())
}
