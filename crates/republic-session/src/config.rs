//! Client session configuration.

use std::time::Duration;

use republic_transport::TransportConfig;

/// Relay the session dials when none is configured.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8765";

/// Connection and request settings for a [`RelaySession`](crate::RelaySession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay address, `ws://` or `wss://`.
    pub url: String,

    /// Dial attempts made by one `connect()` call.
    pub reconnect_attempts: u32,

    /// Pause between failed dial attempts.
    pub reconnect_delay: Duration,

    /// Limit on a single dial attempt, handshake included.
    pub connect_timeout: Duration,

    /// How long `create_room` / `join_room` wait for the relay's answer.
    pub confirmation_timeout: Duration,

    /// How often the session pings the relay while connected.
    pub ping_interval: Duration,

    /// Capacity of the event channel. While it is full the session stops
    /// reading from the relay, so room requests can time out if events are
    /// not drained. Locally raised `Error` events are dropped instead.
    pub event_channel_capacity: usize,

    /// Frame limits for the socket.
    pub transport: TransportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            event_channel_capacity: 256,
            transport: TransportConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Default settings pointed at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.url, "ws://localhost:8765");
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.confirmation_timeout, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_session_config_new_overrides_url_only() {
        let config = SessionConfig::new("ws://relay.example:9000");
        assert_eq!(config.url, "ws://relay.example:9000");
        assert_eq!(config.reconnect_attempts, 3);
    }
}
