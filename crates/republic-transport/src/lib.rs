//! Transport layer for the REPUBLIC relay.
//!
//! Provides the [`Connection`] trait that the relay's connection handler
//! and the client session are written against, plus a WebSocket
//! implementation for both ends of the wire.
//!
//! Every message is one text frame. Frames above
//! [`TransportConfig::max_frame_size`] are rejected here, before anything
//! tries to parse them.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    ClientConnection, PendingConnection, WebSocketConnection,
    WebSocketListener, connect,
};

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Largest frame the relay accepts: 10 MiB.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Limits applied to every connection, on either side.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum size of a single message (and of a single frame).
    pub max_frame_size: usize,

    /// How long [`Connection::recv`] waits for *any* frame (including
    /// pongs) before giving up with [`TransportError::IdleTimeout`].
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,

    /// How long an accepted socket has to finish the WebSocket upgrade.
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            idle_timeout: None,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// A single connection that can send and receive text frames.
///
/// Sending and receiving are independent: a task blocked in `recv` never
/// delays another task's `send` on the same connection.
pub trait Connection: Send + Sync + 'static {
    /// Sends one text frame to the remote peer.
    fn send(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next text frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Sends a keep-alive ping. The peer's pong counts as activity for
    /// the idle timeout but is never surfaced by `recv`.
    fn ping(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }

    #[test]
    fn test_transport_config_default_caps_frames_at_ten_mib() {
        let config = TransportConfig::default();
        assert_eq!(config.max_frame_size, 10 * 1024 * 1024);
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }
}
