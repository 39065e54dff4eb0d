//! Wire envelope shared by both directions: `{"type": ..., "body": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::StreamResult, types::ReplayKey};

/// A typed message with a structured body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(kind: impl Into<String>, body: Value) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    /// The subscription id carried in `body.id`, if it is a string.
    pub fn subscription_id(&self) -> Option<&str> {
        self.body.get("id").and_then(Value::as_str)
    }

    /// The `(type, body.id)` pair used for replay de-duplication.
    pub fn replay_key(&self) -> Option<ReplayKey> {
        self.subscription_id()
            .map(|id| ReplayKey::new(self.kind.clone(), id))
    }

    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> StreamResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An outbound message waiting in the queue.
pub type QueuedMessage = Envelope;

/// An inbound frame after decoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A well-formed envelope.
    Event(Envelope),
    /// Valid JSON that is not an envelope. Only the overflow handler sees these.
    Unrecognized(Value),
}

impl Inbound {
    /// Decode a text frame.
    ///
    /// Fails only if the frame is not JSON at all.
    pub fn decode(text: &str) -> StreamResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::Unrecognized(value);
        };
        match map.remove("type") {
            Some(Value::String(kind)) => {
                let body = map.remove("body").unwrap_or(Value::Null);
                Self::Event(Envelope { kind, body })
            }
            other => {
                if let Some(kind) = other {
                    map.insert("type".to_string(), kind);
                }
                Self::Unrecognized(Value::Object(map))
            }
        }
    }

    /// The frame as a plain JSON value, for the overflow handler.
    pub fn into_value(self) -> Value {
        match self {
            Self::Event(envelope) => {
                let mut map = Map::new();
                map.insert("type".to_string(), Value::String(envelope.kind));
                map.insert("body".to_string(), envelope.body);
                Value::Object(map)
            }
            Self::Unrecognized(value) => value,
        }
    }
}
