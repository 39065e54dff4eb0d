//! Transport seam.
//!
//! The runner only needs four things from a websocket client: open a
//! connection, measure a round trip, send text, and receive text. Keeping
//! them behind traits lets the runner be tested against a scripted peer.

mod tungstenite;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

pub use self::tungstenite::TungsteniteConnector;
use crate::error::StreamResult;

/// Opens connections to the streaming endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection. HTTP rejections must surface as
    /// [`StreamError::Rejected`](crate::StreamError::Rejected).
    async fn open(&self, url: &Url) -> StreamResult<Box<dyn Link>>;
}

/// An open connection, before it is split between the daemon and the
/// receive loop.
#[async_trait]
pub trait Link: Send {
    /// Round-trip health probe. Returns the observed latency.
    async fn ping(&mut self) -> StreamResult<Duration>;

    /// Split into independently owned halves.
    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameSource>);
}

/// Sending half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> StreamResult<()>;
}

/// Receiving half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next text frame.
    ///
    /// Ordinary closure maps to `ConnectionClosed`, silence beyond the
    /// keepalive budget to `Timeout`.
    async fn recv_text(&mut self) -> StreamResult<String>;
}

/// The endpoint without its query string, for logging.
pub(crate) fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
