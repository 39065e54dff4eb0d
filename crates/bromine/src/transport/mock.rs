//! Scripted in-memory transport for runner tests.

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{sync::mpsc, time::Instant};
use url::Url;

use super::{Connector, FrameSink, FrameSource, Link};
use crate::error::{StreamError, StreamResult};

pub(crate) enum Attempt {
    Fail(StreamError),
    Accept(MockLink),
}

/// Plays back one scripted outcome per `open`. Once the script runs out,
/// `open` never completes.
#[derive(Default)]
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Attempt>>,
    opened_at: Mutex<Vec<Instant>>,
}

impl MockConnector {
    pub(crate) fn new(script: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            opened_at: Mutex::new(Vec::new()),
        }
    }

    /// When each `open` call started.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.opened_at.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _url: &Url) -> StreamResult<Box<dyn Link>> {
        self.opened_at.lock().push(Instant::now());
        let next = self.script.lock().pop_front();
        match next {
            Some(Attempt::Fail(e)) => Err(e),
            Some(Attempt::Accept(link)) => Ok(Box::new(link)),
            None => std::future::pending().await,
        }
    }
}

/// The test's side of a [`MockLink`].
pub(crate) struct MockPeer {
    inbound: mpsc::UnboundedSender<StreamResult<String>>,
    pub(crate) outbound: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    /// Deliver a text frame to the client.
    pub(crate) fn push(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Ok(text.into()));
    }

    /// Make the client's next receive fail.
    pub(crate) fn fail(&self, error: StreamError) {
        let _ = self.inbound.send(Err(error));
    }

    /// Next frame the client sent.
    pub(crate) async fn sent(&mut self) -> Option<String> {
        self.outbound.recv().await
    }
}

pub(crate) struct MockLink {
    inbound: mpsc::UnboundedReceiver<StreamResult<String>>,
    outbound: mpsc::UnboundedSender<String>,
    latency: Duration,
}

pub(crate) fn mock_link() -> (MockLink, MockPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let link = MockLink {
        inbound: in_rx,
        outbound: out_tx,
        latency: Duration::from_millis(5),
    };
    let peer = MockPeer {
        inbound: in_tx,
        outbound: out_rx,
    };
    (link, peer)
}

#[async_trait]
impl Link for MockLink {
    async fn ping(&mut self) -> StreamResult<Duration> {
        Ok(self.latency)
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameSource>) {
        (
            Box::new(MockSink {
                outbound: self.outbound,
            }),
            Box::new(MockSource {
                inbound: self.inbound,
            }),
        )
    }
}

struct MockSink {
    outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> StreamResult<()> {
        self.outbound
            .send(text)
            .map_err(|_| StreamError::connection_closed(Some("peer gone".to_string())))
    }
}

struct MockSource {
    inbound: mpsc::UnboundedReceiver<StreamResult<String>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn recv_text(&mut self) -> StreamResult<String> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            None => Err(StreamError::connection_closed(Some("peer gone".to_string()))),
        }
    }
}
