use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::Mutex, time::Instant};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{self, Message, protocol::CloseFrame},
};
use tracing::{debug, warn};
use url::Url;

use super::{Connector, FrameSink, FrameSource, Link, redacted};
use crate::{
    config::StreamConfig,
    error::{StreamError, StreamResult},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

const PING_PAYLOAD: &[u8] = b"bromine";

#[derive(Clone, Copy, Debug)]
struct ReadLimits {
    keepalive_interval: Option<Duration>,
    keepalive_timeout: Duration,
    max_message_size: usize,
}

/// [`Connector`] backed by `tokio-tungstenite` with rustls.
#[derive(Clone, Debug)]
pub struct TungsteniteConnector {
    limits: ReadLimits,
}

impl TungsteniteConnector {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            limits: ReadLimits {
                keepalive_interval: config.keepalive_interval,
                keepalive_timeout: config.keepalive_timeout,
                max_message_size: config.max_message_size,
            },
        }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, url: &Url) -> StreamResult<Box<dyn Link>> {
        // Fails harmlessly if a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        debug!(
            url = %redacted(url),
            status = response.status().as_u16(),
            "WebSocket handshake complete"
        );

        Ok(Box::new(TungsteniteLink {
            stream,
            pending: VecDeque::new(),
            limits: self.limits,
        }))
    }
}

struct TungsteniteLink {
    stream: WsStream,
    /// Text frames that arrived while waiting for a pong.
    pending: VecDeque<String>,
    limits: ReadLimits,
}

#[async_trait]
impl Link for TungsteniteLink {
    async fn ping(&mut self) -> StreamResult<Duration> {
        let started = Instant::now();
        self.stream
            .send(Message::Ping(PING_PAYLOAD.to_vec()))
            .await?;

        loop {
            match into_message(self.stream.next().await)? {
                Message::Pong(_) => return Ok(started.elapsed()),
                Message::Text(text) => self.pending.push_back(text),
                Message::Close(frame) => return Err(closed(frame)),
                _ => {}
            }
        }
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameSource>) {
        let (sink, stream) = self.stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let source = TungsteniteSource {
            stream,
            sink: Arc::clone(&sink),
            pending: self.pending,
            limits: self.limits,
        };
        (Box::new(TungsteniteSink { sink }), Box::new(source))
    }
}

struct TungsteniteSink {
    sink: WsSink,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> StreamResult<()> {
        self.sink.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }
}

struct TungsteniteSource {
    stream: SplitStream<WsStream>,
    /// Shared with the sink for keepalive pings.
    sink: WsSink,
    pending: VecDeque<String>,
    limits: ReadLimits,
}

impl TungsteniteSource {
    async fn next_message(&mut self) -> StreamResult<Message> {
        let Some(interval) = self.limits.keepalive_interval else {
            return into_message(self.stream.next().await);
        };

        if let Ok(item) = tokio::time::timeout(interval, self.stream.next()).await {
            return into_message(item);
        }

        debug!(idle_ms = interval.as_millis() as u64, "Connection idle, sending keepalive ping");
        self.sink
            .lock()
            .await
            .send(Message::Ping(PING_PAYLOAD.to_vec()))
            .await?;

        match tokio::time::timeout(self.limits.keepalive_timeout, self.stream.next()).await {
            Ok(item) => into_message(item),
            Err(_) => Err(StreamError::timeout(interval + self.limits.keepalive_timeout)),
        }
    }
}

#[async_trait]
impl FrameSource for TungsteniteSource {
    async fn recv_text(&mut self) -> StreamResult<String> {
        if let Some(text) = self.pending.pop_front() {
            return Ok(text);
        }

        loop {
            match self.next_message().await? {
                Message::Text(text) if text.len() > self.limits.max_message_size => {
                    warn!(
                        size = text.len(),
                        limit = self.limits.max_message_size,
                        "Dropping oversized frame"
                    );
                }
                Message::Text(text) => return Ok(text),
                Message::Binary(data) => {
                    debug!(len = data.len(), "Ignoring binary frame");
                }
                Message::Close(frame) => return Err(closed(frame)),
                _ => {}
            }
        }
    }
}

fn into_message(item: Option<Result<Message, tungstenite::Error>>) -> StreamResult<Message> {
    match item {
        Some(Ok(message)) => Ok(message),
        Some(Err(e)) => Err(e.into()),
        None => Err(StreamError::connection_closed(None)),
    }
}

fn closed(frame: Option<CloseFrame<'_>>) -> StreamError {
    StreamError::connection_closed(
        frame.map(|frame| format!("{} {}", u16::from(frame.code), frame.reason)),
    )
}
