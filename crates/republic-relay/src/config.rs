//! Relay configuration.

use std::time::Duration;

use republic_room::RoomConfig;
use republic_transport::{MAX_FRAME_SIZE, TransportConfig};

/// Port the relay listens on when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8765;

/// Settings for one relay process.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the listener binds to.
    pub bind_addr: String,

    /// Largest inbound message, in bytes.
    pub max_frame_size: usize,

    /// How often each socket is pinged.
    pub ping_interval: Duration,

    /// How long past `ping_interval` a silent socket is kept open.
    pub ping_timeout: Duration,

    /// How long a new socket has to complete the WebSocket upgrade.
    pub handshake_timeout: Duration,

    /// How often idle rooms are swept.
    pub reclaim_interval: Duration,

    /// Idle time after which a room counts as stale.
    pub stale_after: Duration,

    /// How often a status line is logged.
    pub status_interval: Duration,

    /// Limits applied to every room.
    pub room: RoomConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_frame_size: MAX_FRAME_SIZE,
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            reclaim_interval: Duration::from_secs(5 * 60),
            stale_after: Duration::from_secs(60 * 60),
            status_interval: Duration::from_secs(60),
            room: RoomConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Defaults, with the port taken from the `PORT` environment variable.
    pub fn from_env() -> Self {
        Self::default().with_port_var(std::env::var("PORT").ok().as_deref())
    }

    /// Applies a raw `PORT` value. Anything that is not a valid port is
    /// logged and ignored.
    pub fn with_port_var(mut self, raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return self;
        };
        match raw.trim().parse::<u16>() {
            Ok(port) => self.bind_addr = format!("0.0.0.0:{port}"),
            Err(e) => tracing::warn!(
                value = raw,
                error = %e,
                default = DEFAULT_PORT,
                "invalid PORT, using default"
            ),
        }
        self
    }

    /// How long a socket may stay silent, pongs included, before it is
    /// dropped.
    pub fn idle_timeout(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            max_frame_size: self.max_frame_size,
            idle_timeout: Some(self.idle_timeout()),
            handshake_timeout: self.handshake_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8765");
        assert_eq!(config.max_frame_size, 10 * 1024 * 1024);
        assert_eq!(config.idle_timeout(), Duration::from_secs(40));
        assert_eq!(config.reclaim_interval, Duration::from_secs(300));
        assert_eq!(config.stale_after, Duration::from_secs(3600));
        assert_eq!(config.status_interval, Duration::from_secs(60));
        assert_eq!(config.room.max_players, 4);
    }

    #[test]
    fn test_with_port_var_sets_port() {
        let config = RelayConfig::default().with_port_var(Some("9000"));
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_with_port_var_invalid_keeps_default() {
        let config = RelayConfig::default().with_port_var(Some("eighty"));
        assert_eq!(config.bind_addr, "0.0.0.0:8765");

        let config = RelayConfig::default().with_port_var(Some("70000"));
        assert_eq!(config.bind_addr, "0.0.0.0:8765");
    }

    #[test]
    fn test_with_port_var_unset_keeps_default() {
        let config = RelayConfig::default().with_port_var(None);
        assert_eq!(config.bind_addr, "0.0.0.0:8765");
    }

    #[test]
    fn test_transport_applies_idle_timeout() {
        let config = RelayConfig {
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(2),
            ..RelayConfig::default()
        };
        let transport = config.transport();
        assert_eq!(transport.idle_timeout, Some(Duration::from_secs(7)));
        assert_eq!(transport.max_frame_size, config.max_frame_size);
        assert_eq!(transport.handshake_timeout, Duration::from_secs(10));
    }
}
