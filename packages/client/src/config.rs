//! Connection configuration.

use std::time::Duration;

use crate::sync::ReconnectPolicy;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/websocket";
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(4000);
pub const DEFAULT_HEARTBEAT_GRACE: u32 = 2;

/// Requested keep-alive intervals. Zero disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often we promise to send something
    pub outgoing: Duration,
    /// How often we want to hear from the peer
    pub incoming: Duration,
    /// Multiple of the incoming interval after which silence is a transport error
    pub grace: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            outgoing: DEFAULT_HEARTBEAT,
            incoming: DEFAULT_HEARTBEAT,
            grace: DEFAULT_HEARTBEAT_GRACE,
        }
    }
}

impl HeartbeatConfig {
    /// Both directions at the same interval
    pub fn symmetric(interval: Duration) -> Self {
        Self {
            outgoing: interval,
            incoming: interval,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::symmetric(Duration::ZERO)
    }
}

/// Settings for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint URL (`ws://` for the pub/sub channel, `http://` for the stream)
    pub url: String,
    pub connect_timeout: Duration,
    pub heartbeat: HeartbeatConfig,
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL)
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Settings for the metrics event stream.
    ///
    /// The stream has no keep-alive of its own, so heartbeats start disabled;
    /// set `heartbeat.incoming` to turn on an idle timeout.
    pub fn event_stream(url: impl Into<String>) -> Self {
        Self {
            heartbeat: HeartbeatConfig::disabled(),
            ..Self::new(url)
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Build the metrics stream URL from the REST base (`{api}/metrics/stream`)
pub fn metrics_stream_url(api_url: &str) -> String {
    format!("{}/metrics/stream", api_url.trim_end_matches('/'))
}
