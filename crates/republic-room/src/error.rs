//! Error types for the room layer.
//!
//! The `Display` text of each variant is exactly what the requester sees in
//! `room_error.data.message`, so it is written for players, not operators.

use republic_protocol::RoomCode;

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// `create_room` with a code that a live room already uses.
    #[error("Room {0} already exists. Try a different code.")]
    AlreadyExists(RoomCode),

    /// No live room has this code.
    #[error("Room {0} not found. Check the code and try again.")]
    NotFound(String),

    /// The room already holds `max` players.
    #[error("Room {code} is full (max {max} players).")]
    Full { code: RoomCode, max: usize },

    /// The host has started the game; the room is closed to new players.
    #[error("Game already in progress in room {0}.")]
    GameInProgress(RoomCode),

    /// The requested code is not 4 characters from the room-code alphabet.
    #[error("Invalid room code {0:?}.")]
    InvalidCode(String),
}
