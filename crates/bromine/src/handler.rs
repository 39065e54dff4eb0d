//! Handler and hook traits.
//!
//! Event handlers receive the `body` of an inbound envelope (or the whole
//! frame, for the overflow handler). Comeback hooks run after every fresh
//! connection. Both traits are implemented for async closures, so most
//! callers never implement them by hand:
//!
//! ```rust,ignore
//! client.sub_note("9abc", |body: serde_json::Value| async move {
//!     println!("note updated: {body}");
//! })?;
//!
//! client.add_comeback(|| async { Ok::<(), HookError>(()) }, true, None)?;
//! ```

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// Error type for comeback hooks.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Hook execution failed with a message.
    #[error("Hook failed: {message}")]
    Failed { message: String },

    /// Custom error from hook implementation.
    #[error("Hook error: {0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl HookError {
    /// Create a new failed hook error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Create a custom hook error.
    pub fn custom<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Custom(Box::new(error))
    }
}

/// Receives inbound events routed by the dispatch table.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event. Runs on its own task; never blocks the receive loop.
    async fn handle(&self, payload: Value);
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, payload: Value) {
        (self)(payload).await
    }
}

/// Runs immediately after a connection is (re)established.
#[async_trait]
pub trait ComebackHook: Send + Sync + 'static {
    /// Run the hook once for the new connection.
    async fn run(&self) -> Result<(), HookError>;
}

#[async_trait]
impl<F, Fut> ComebackHook for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    async fn run(&self) -> Result<(), HookError> {
        (self)().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn closures_are_event_handlers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handler: Arc<dyn EventHandler> = Arc::new(move |body: Value| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(body["id"], "x");
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        handler.handle(json!({"id": "x"})).await;
        handler.handle(json!({"id": "x"})).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closures_are_comeback_hooks() {
        let ok: Arc<dyn ComebackHook> = Arc::new(|| async { Ok::<(), HookError>(()) });
        assert!(ok.run().await.is_ok());

        let failing: Arc<dyn ComebackHook> =
            Arc::new(|| async { Err::<(), _>(HookError::failed("nope")) });
        let err = failing.run().await.expect_err("hook should fail");
        assert_eq!(err.to_string(), "Hook failed: nope");
    }
}
