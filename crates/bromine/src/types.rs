//! Core type definitions for subscriptions and replay.

use std::fmt;

/// Inbound event type carrying channel traffic.
pub const CHANNEL_EVENT: &str = "channel";
/// Inbound event type carrying per-note updates.
pub const NOTE_UPDATED_EVENT: &str = "noteUpdated";

/// Outbound control message types understood by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutboundKind {
    /// Establish a channel subscription: `{channel, id, params}`.
    Connect,
    /// Tear down a channel subscription: `{id}`.
    Disconnect,
    /// Subscribe to updates on one note: `{id}`.
    SubNote,
    /// Stop note updates: `{id}`.
    UnsubNote,
}

impl OutboundKind {
    /// Wire name of the message type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::SubNote => "subNote",
            Self::UnsubNote => "unsubNote",
        }
    }
}

impl fmt::Display for OutboundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channels every Misskey server offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelName {
    HomeTimeline,
    LocalTimeline,
    HybridTimeline,
    GlobalTimeline,
    Main,
}

impl ChannelName {
    /// Wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HomeTimeline => "homeTimeline",
            Self::LocalTimeline => "localTimeline",
            Self::HybridTimeline => "hybridTimeline",
            Self::GlobalTimeline => "globalTimeline",
            Self::Main => "main",
        }
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which subscription ids an entry matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// Events whose `body.id` equals this id.
    Exact(String),
    /// Every event of the type not claimed by an exact entry.
    Wildcard,
}

impl MatchKind {
    /// Create an exact matcher.
    pub fn exact(id: impl Into<String>) -> Self {
        Self::Exact(id.into())
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(id) => f.write_str(id),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

impl From<&str> for MatchKind {
    fn from(id: &str) -> Self {
        Self::Exact(id.to_string())
    }
}

impl From<String> for MatchKind {
    fn from(id: String) -> Self {
        Self::Exact(id)
    }
}

/// Dispatch key of a subscription: event type plus matcher.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub event_type: String,
    pub matcher: MatchKind,
}

impl SubscriptionKey {
    /// Create a key from an event type and a matcher.
    pub fn new(event_type: impl Into<String>, matcher: impl Into<MatchKind>) -> Self {
        Self {
            event_type: event_type.into(),
            matcher: matcher.into(),
        }
    }

    /// Key matching one id exactly.
    pub fn exact(event_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(event_type, MatchKind::Exact(id.into()))
    }

    /// Key catching every unclaimed event of `event_type`.
    pub fn wildcard(event_type: impl Into<String>) -> Self {
        Self::new(event_type, MatchKind::Wildcard)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event_type, self.matcher)
    }
}

/// Key of a replay entry, and of a message already sent on a connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReplayKey {
    pub message_type: String,
    pub id: String,
}

impl ReplayKey {
    pub fn new(message_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ReplayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.message_type, self.id)
    }
}
