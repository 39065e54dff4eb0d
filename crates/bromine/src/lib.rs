//! # Bromine
//!
//! Resilient client for the Misskey streaming API.
//!
//! One websocket connection to `/streaming` is multiplexed into many logical
//! subscriptions. The client keeps them alive across reconnects, routes
//! inbound events to the right handler and queues outbound messages while
//! the connection is being re-established.
//!
//! ## Features
//!
//! - **Reconnect loop**: fixed cool-down, a long penalty after repeated
//!   failures, and classification of transient versus fatal errors
//! - **Replay**: channel and note subscriptions are re-sent on every fresh
//!   connection, without duplicating requests queued in the meantime
//! - **Comeback hooks**: code that runs after each (re)connect, blocking
//!   dispatch or alongside it
//! - **Dispatch**: exact id, wildcard and overflow handlers
//! - **Observability**: `tracing` logs, a state watch and lifecycle events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bromine::{ChannelName, StreamClient, StreamConfig};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamClient::new(StreamConfig::new("misskey.example").token("TOKEN"))?;
//!
//!     client.connect_channel(
//!         ChannelName::HomeTimeline,
//!         |body: Value| async move { println!("{body}") },
//!         None,
//!         Value::Null,
//!     )?;
//!
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod registry;
pub mod transport;
pub mod types;

mod client;
mod daemon;
mod dispatch;
mod queue;
mod reconnect;
mod runner;
mod tasks;

// Re-export commonly used types
pub use client::StreamClient;
pub use config::StreamConfig;
pub use envelope::{Envelope, Inbound};
pub use error::{FailureClass, StreamError, StreamResult};
pub use handler::{ComebackHook, EventHandler, HookError};
pub use runner::{ConnectionEpoch, ConnectionState, LifecycleEvent};
pub use transport::{Connector, FrameSink, FrameSource, Link, TungsteniteConnector};
pub use types::{ChannelName, MatchKind, OutboundKind, SubscriptionKey};
