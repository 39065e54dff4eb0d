//! Per-connection send daemon.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, info};

use crate::{
    error::StreamResult, queue::OutboundQueue, registry::ReplayRegistry, transport::FrameSink,
};

/// Drain the outbound queue onto one connection.
///
/// Every replay entry is sent first. Messages already waiting in the queue
/// are then sent unless the replay pass already covered their
/// `(type, body.id)`. After that every queued message is sent as-is, in
/// order, until the connection fails or the task is aborted.
pub(crate) async fn send_daemon(
    replay: Arc<ReplayRegistry>,
    queue: Arc<OutboundQueue>,
    mut sink: Box<dyn FrameSink>,
) -> StreamResult<()> {
    let mut rx = queue.receiver().await;
    let mut sent = HashSet::new();

    let entries = replay.snapshot();
    let replayed = entries.len();
    for envelope in entries {
        let key = envelope.replay_key();
        sink.send_text(envelope.to_text()?).await?;
        sent.extend(key);
    }
    if replayed > 0 {
        info!(count = replayed, "Replayed subscriptions");
    }

    while let Ok(message) = rx.try_recv() {
        let key = message.replay_key();
        if let Some(key) = &key
            && sent.contains(key)
        {
            debug!(key = %key, "Skipping message already sent by replay");
            continue;
        }
        sink.send_text(message.to_text()?).await?;
        sent.extend(key);
    }
    drop(sent);

    while let Some(message) = rx.recv().await {
        sink.send_text(message.to_text()?).await?;
    }
    Ok(())
}
