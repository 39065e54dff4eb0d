//! Error handling for the streaming client.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::handler::HookError;

/// The main result type used throughout the client.
pub type StreamResult<T> = Result<T, StreamError>;

/// How the connection runner reacts to a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Cool down and reconnect.
    Transient,
    /// Tear down and surface the error from `run`.
    Unrecoverable,
}

/// Error type for registration calls and the connection lifecycle.
#[derive(Error, Debug)]
pub enum StreamError {
    /// A handler or hook is already registered under this id.
    #[error("id already registered: {id}")]
    DuplicateId { id: String },

    /// A replay entry already exists for this message type and id.
    #[error("replay entry already registered: type={message_type}, id={id}")]
    DuplicateKey { message_type: String, id: String },

    /// No registration exists under this id.
    #[error("id not registered: {id}")]
    NotFound { id: String },

    /// The engine is not running, so nothing can be queued.
    #[error("streaming client is not running")]
    NotRunning,

    /// `run` was called while another `run` is in progress.
    #[error("streaming client is already running")]
    AlreadyRunning,

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The connection was closed by the peer or dropped underneath us.
    #[error("Connection closed: {}", reason.as_deref().unwrap_or("no reason given"))]
    ConnectionClosed { reason: Option<String> },

    /// The server refused the websocket upgrade.
    #[error("Connection rejected with status {status}")]
    Rejected { status: u16 },

    /// WebSocket errors
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// I/O errors that do not look like an ordinary disconnect.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A blocking comeback hook failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StreamError {
    /// Create a duplicate id error.
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Create a duplicate replay key error.
    pub fn duplicate_key(message_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateKey {
            message_type: message_type.into(),
            id: id.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a connection closed error.
    pub fn connection_closed(reason: Option<String>) -> Self {
        Self::ConnectionClosed { reason }
    }

    /// Classify this error for the reconnect loop.
    ///
    /// Timeouts and ordinary closes are retried. A rejection is retried
    /// unless the server answered with a 4xx status. Anything else ends `run`.
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::Timeout { .. } | Self::ConnectionClosed { .. } => FailureClass::Transient,
            Self::Rejected { status } if (400..500).contains(status) => {
                FailureClass::Unrecoverable
            }
            Self::Rejected { .. } => FailureClass::Transient,
            _ => FailureClass::Unrecoverable,
        }
    }

    /// Returns true if the runner will retry after this error.
    pub fn is_transient(&self) -> bool {
        self.classify() == FailureClass::Transient
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(e: tungstenite::Error) -> Self {
        use std::io::ErrorKind;
        use tungstenite::{Error, error::ProtocolError};

        match e {
            Error::ConnectionClosed | Error::AlreadyClosed => Self::connection_closed(None),
            Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                Self::connection_closed(Some("reset without closing handshake".to_string()))
            }
            Error::Io(err)
                if matches!(
                    err.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::BrokenPipe
                        | ErrorKind::UnexpectedEof
                ) =>
            {
                Self::connection_closed(Some(err.to_string()))
            }
            Error::Io(err) => Self::Io(err),
            Error::Http(response) => Self::Rejected {
                status: response.status().as_u16(),
            },
            other => Self::websocket(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StreamError::config("host cannot be empty");
        assert!(matches!(err, StreamError::Config { .. }));

        let err = StreamError::duplicate_key("connect", "abc");
        assert_eq!(
            err.to_string(),
            "replay entry already registered: type=connect, id=abc"
        );

        let err = StreamError::connection_closed(None);
        assert_eq!(err.to_string(), "Connection closed: no reason given");
    }

    #[test]
    fn client_errors_are_unrecoverable() {
        assert_eq!(
            StreamError::Rejected { status: 403 }.classify(),
            FailureClass::Unrecoverable
        );
        assert_eq!(
            StreamError::Rejected { status: 400 }.classify(),
            FailureClass::Unrecoverable
        );
    }

    #[test]
    fn other_rejections_are_transient() {
        assert!(StreamError::Rejected { status: 503 }.is_transient());
        assert!(StreamError::Rejected { status: 301 }.is_transient());
    }

    #[test]
    fn timeouts_and_closes_are_transient() {
        assert!(StreamError::timeout(Duration::from_secs(1)).is_transient());
        assert!(StreamError::connection_closed(Some("bye".into())).is_transient());
    }

    #[test]
    fn unclassified_errors_are_unrecoverable() {
        assert!(!StreamError::internal("boom").is_transient());
        assert!(!StreamError::websocket("bad frame").is_transient());
        assert!(!StreamError::Hook(HookError::failed("nope")).is_transient());
    }

    #[test]
    fn tungstenite_errors_are_mapped() {
        let err: StreamError = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, StreamError::ConnectionClosed { .. }));

        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        let err: StreamError = tungstenite::Error::Io(reset).into();
        assert!(err.is_transient());

        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        let err: StreamError = tungstenite::Error::Io(refused).into();
        assert!(matches!(err, StreamError::Io(_)));

        let response = tungstenite::http::Response::builder()
            .status(403)
            .body(None)
            .expect("response");
        let err: StreamError = tungstenite::Error::Http(response).into();
        assert!(matches!(err, StreamError::Rejected { status: 403 }));
    }
}
