//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in the bytes on the wire
//! (or in the shape of a payload), never in networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into JSON).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing `type`, or a
    /// field of the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope parsed, but its `data` does not have the shape its
    /// kind requires.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// A payload serialized to something other than a JSON object.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A room code that is not 4 characters from the room-code alphabet.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),
}

impl ProtocolError {
    /// The text was not JSON at all, as opposed to JSON of the wrong shape.
    pub fn is_malformed_json(&self) -> bool {
        use serde_json::error::Category;
        match self {
            Self::Decode(e) => matches!(e.classify(), Category::Syntax | Category::Eof),
            _ => false,
        }
    }
}
