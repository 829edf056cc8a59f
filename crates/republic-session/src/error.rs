//! Error types for the client session.

use std::time::Duration;

use republic_protocol::ProtocolError;
use republic_transport::TransportError;

/// Errors returned by [`RelaySession`](crate::RelaySession) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every dial attempt failed.
    #[error("could not reach the relay after {attempts} attempt(s)")]
    ConnectFailed { attempts: u32 },

    /// The relay did not answer a room request in time.
    #[error("no answer from the relay within {0:?}")]
    Timeout(Duration),

    /// The relay refused a room request. The message is meant for the
    /// player as-is.
    #[error("{0}")]
    Room(String),

    /// The operation needs a live connection and there is none.
    #[error("not connected to a relay")]
    NotConnected,

    /// The socket failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_error_displays_relay_message() {
        let err = SessionError::Room("Room ABCD not found.".into());
        assert_eq!(err.to_string(), "Room ABCD not found.");
    }

    #[test]
    fn test_from_transport_error() {
        let err: SessionError =
            TransportError::InvalidFrame("gone".into()).into();
        assert!(matches!(err, SessionError::Transport(_)));
    }
}
