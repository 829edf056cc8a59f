/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Dialing a remote relay failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Nothing arrived from the peer within the idle timeout.
    #[error("connection idle for longer than {0:?}")]
    IdleTimeout(std::time::Duration),

    /// The peer sent a binary frame that is not UTF-8 text.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
