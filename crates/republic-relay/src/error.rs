//! Error type for the relay.

use republic_transport::TransportError;

/// Errors that end a relay operation.
///
/// Room and protocol problems never get here: they are answered in-band
/// with `room_error` or `error` and the socket keeps going. What is left is
/// the socket layer failing.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),
}
