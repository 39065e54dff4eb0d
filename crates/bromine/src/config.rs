//! Streaming client configuration.

use std::time::Duration;

use url::Url;

use crate::{
    error::{StreamError, StreamResult},
    reconnect::CooldownPolicy,
};

/// Configuration for the streaming client.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    // Endpoint
    /// Instance host, e.g. `misskey.example` or `localhost:3000`.
    pub host: String,
    /// Access token, sent as the `i` query parameter.
    pub token: Option<String>,
    /// Use `wss://` (true) or `ws://` (false).
    pub secure: bool,

    // Reconnection settings
    /// Time to wait after a transient failure before reconnecting.
    pub cool_down: Duration,
    /// Random jitter factor (0.0-1.0) applied to the cool-down.
    pub cool_down_jitter: f64,
    /// Consecutive failures tolerated before the penalty kicks in.
    pub penalty_threshold: u32,
    /// Extra wait once `penalty_threshold` is exceeded.
    pub penalty: Duration,

    // Connection
    /// Timeout for opening the transport.
    pub connect_timeout: Duration,
    /// Timeout for the liveness ping after opening.
    pub ping_timeout: Duration,
    /// Idle time after which the transport pings the server (None = never).
    pub keepalive_interval: Option<Duration>,
    /// Time allowed for any frame to arrive after a keepalive ping.
    pub keepalive_timeout: Duration,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,

    // Channels
    /// Capacity of the lifecycle event broadcast channel.
    pub lifecycle_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            token: None,
            secure: true,
            cool_down: Duration::from_secs(5),
            cool_down_jitter: 0.0,
            penalty_threshold: 5,
            penalty: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(20),
            keepalive_interval: Some(Duration::from_secs(20)),
            keepalive_timeout: Duration::from_secs(20),
            max_message_size: 16 * 1024 * 1024, // 16 MB
            lifecycle_channel_capacity: 64,
        }
    }
}

impl StreamConfig {
    /// Create a new configuration for the given instance host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set the access token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Choose between `wss://` and `ws://`.
    ///
    /// Only local or test instances should need `false`.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the reconnect cool-down.
    #[must_use]
    pub fn cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }

    /// Set the cool-down jitter factor.
    #[must_use]
    pub fn cool_down_jitter(mut self, jitter: f64) -> Self {
        self.cool_down_jitter = jitter;
        self
    }

    /// Set how many consecutive failures are tolerated before the penalty.
    #[must_use]
    pub fn penalty_threshold(mut self, threshold: u32) -> Self {
        self.penalty_threshold = threshold;
        self
    }

    /// Set the penalty wait.
    #[must_use]
    pub fn penalty(mut self, penalty: Duration) -> Self {
        self.penalty = penalty;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the liveness ping timeout.
    #[must_use]
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set the keepalive interval.
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the keepalive timeout.
    #[must_use]
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub(crate) fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            cool_down: self.cool_down,
            jitter: self.cool_down_jitter,
            penalty_threshold: self.penalty_threshold,
            penalty: self.penalty,
        }
    }

    /// Build the streaming endpoint URL.
    pub fn endpoint(&self) -> StreamResult<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = Url::parse(&format!("{scheme}://{}/streaming", self.host))
            .map_err(|e| StreamError::config(format!("Invalid host {:?}: {e}", self.host)))?;
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("i", token);
        }
        Ok(url)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }
        if self.host.contains('/') {
            return Err("Host must not contain a scheme or path".to_string());
        }
        self.cooldown_policy().validate()?;
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.ping_timeout.is_zero() {
            return Err("Ping timeout must be > 0".to_string());
        }
        if self.keepalive_interval.is_some_and(|interval| interval.is_zero()) {
            return Err("Keepalive interval must be > 0".to_string());
        }
        if self.keepalive_timeout.is_zero() {
            return Err("Keepalive timeout must be > 0".to_string());
        }
        if self.lifecycle_channel_capacity == 0 {
            return Err("Lifecycle channel capacity must be > 0".to_string());
        }
        Ok(())
    }
}
