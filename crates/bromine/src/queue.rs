//! Outbound message queue.
//!
//! Unbounded FIFO shared by every caller. The receiving half is held by the
//! send daemon of the live connection; between connections it waits behind
//! its mutex, so messages queued while reconnecting are kept.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard, mpsc};

use crate::{
    envelope::QueuedMessage,
    error::{StreamError, StreamResult},
};

pub(crate) type QueueReceiver = mpsc::UnboundedReceiver<QueuedMessage>;

pub(crate) struct OutboundQueue {
    tx: mpsc::UnboundedSender<QueuedMessage>,
    rx: Mutex<QueueReceiver>,
    running: AtomicBool,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            running: AtomicBool::new(false),
        }
    }

    /// Append a message. Fails with `NotRunning` while the engine is stopped.
    pub(crate) fn push(&self, message: QueuedMessage) -> StreamResult<()> {
        if !self.is_running() {
            return Err(StreamError::NotRunning);
        }
        self.tx
            .send(message)
            .map_err(|_| StreamError::internal("outbound queue receiver dropped"))
    }

    /// Mark the engine as running. Returns false if it already was.
    ///
    /// Messages left over from a previous run are discarded.
    ///
    /// Leftovers are drained while pushes are still refused, so anything
    /// accepted after this returns is kept. Concurrent opens must be
    /// serialized by the caller.
    pub(crate) fn open(&self) -> bool {
        if self.is_running() {
            return false;
        }
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn close(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Exclusive access to the receiving half.
    pub(crate) async fn receiver(&self) -> MutexGuard<'_, QueueReceiver> {
        self.rx.lock().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::envelope::Envelope;

    #[tokio::test]
    async fn push_while_stopped_leaves_queue_untouched() {
        let queue = OutboundQueue::new();
        let err = queue
            .push(Envelope::new("subNote", json!({"id": "n1"})))
            .unwrap_err();
        assert!(matches!(err, StreamError::NotRunning));

        let mut rx = queue.receiver().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn push_while_running_is_fifo() {
        let queue = OutboundQueue::new();
        assert!(queue.open());
        assert!(!queue.open());

        for id in ["a", "b", "c"] {
            queue
                .push(Envelope::new("subNote", json!({"id": id})))
                .expect("push");
        }

        let mut rx = queue.receiver().await;
        for id in ["a", "b", "c"] {
            let message = rx.try_recv().expect("queued");
            assert_eq!(message.subscription_id(), Some(id));
        }
    }

    #[tokio::test]
    async fn reopening_discards_leftovers() {
        let queue = OutboundQueue::new();
        queue.open();
        queue.push(Envelope::new("x", json!({}))).expect("push");
        queue.close();

        assert!(queue.open());
        let mut rx = queue.receiver().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pushes_racing_open_are_kept() {
        const PUSHES: usize = 500;
        let queue = std::sync::Arc::new(OutboundQueue::new());
        queue.open();
        queue.push(Envelope::new("stale", json!({}))).expect("push");
        queue.close();

        let pusher = {
            let queue = std::sync::Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut accepted = 0;
                while accepted < PUSHES {
                    if queue.push(Envelope::new("x", json!({}))).is_ok() {
                        accepted += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(queue.open());
        pusher.join().expect("pusher");

        let mut rx = queue.receiver().await;
        let mut received = 0;
        while let Ok(message) = rx.try_recv() {
            assert_eq!(message.kind, "x");
            received += 1;
        }
        assert_eq!(received, PUSHES);
    }

    #[test]
    fn close_stops_accepting() {
        let queue = OutboundQueue::new();
        queue.open();
        queue.close();
        assert!(!queue.is_running());
        assert!(queue.push(Envelope::new("x", json!({}))).is_err());
    }
}
