//! Task groups owned by the connection runner.

use std::future::Future;

use tokio::task::{JoinError, JoinSet};
use tracing::warn;

use crate::{error::StreamResult, handler::HookError};

/// Handler invocations spawned by the receive loop.
///
/// Finished members are reaped on every spawn. The group outlives individual
/// connections and is only cancelled when the runner exits.
#[derive(Default)]
pub(crate) struct BackgroundTasks {
    tasks: JoinSet<()>,
}

impl BackgroundTasks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        self.tasks.spawn(task);
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result
                && e.is_panic()
            {
                warn!(error = %e, "Event handler panicked");
            }
        }
    }

    /// Abort every running handler and wait for all of them to settle.
    pub(crate) async fn cancel_all(&mut self) {
        self.tasks.shutdown().await;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Outcome of one non-blocking comeback hook.
pub(crate) type ComebackOutcome = (String, Result<(), HookError>);

/// Tasks scoped to a single connection.
#[derive(Default)]
pub(crate) struct ConnectionTasks {
    pub(crate) daemon: JoinSet<StreamResult<()>>,
    pub(crate) comebacks: JoinSet<ComebackOutcome>,
}

impl ConnectionTasks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Abort the send daemon and the comeback batch, waiting until both
    /// have fully stopped.
    pub(crate) async fn teardown(&mut self) {
        self.daemon.shutdown().await;

        self.comebacks.abort_all();
        while let Some(result) = self.comebacks.join_next().await {
            log_comeback(result);
        }
    }
}

/// Log a failed non-blocking comeback hook. Failures are never propagated.
pub(crate) fn log_comeback(result: Result<ComebackOutcome, JoinError>) {
    match result {
        Ok((_, Ok(()))) => {}
        Ok((id, Err(e))) => warn!(id = %id, error = %e, "Comeback hook failed"),
        Err(e) if e.is_panic() => warn!(error = %e, "Comeback hook panicked"),
        Err(_) => {}
    }
}
