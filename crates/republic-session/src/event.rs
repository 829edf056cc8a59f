//! Connection states and the events a session reports.

use republic_protocol::payload::Stats;
use republic_protocol::{PlayerId, PlayerInfo};
use serde_json::Value;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    InRoom,
    GameActive,
    /// The last connect failed or the socket broke. `connect()` recovers.
    Error,
}

impl ConnectionState {
    /// The socket is up.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::InRoom | Self::GameActive)
    }

    pub fn is_in_room(self) -> bool {
        matches!(self, Self::InRoom | Self::GameActive)
    }
}

/// Something the relay told the session, or a change in the connection.
///
/// Delivered on the channel returned by
/// [`RelaySession::new`](crate::RelaySession::new).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Someone joined the room.
    PlayerJoined(PlayerInfo),

    /// Someone left the room.
    PlayerLeft(PlayerId),

    /// The host left and `new_host_id` took over.
    HostChanged { new_host_id: PlayerId, is_self: bool },

    /// The host started the game.
    GameStarted {
        from: Option<PlayerId>,
        initial_state: Value,
    },

    /// A full state snapshot from another player.
    GameState {
        from: Option<PlayerId>,
        game_state: Value,
    },

    /// One action from another player.
    GameAction {
        from: Option<PlayerId>,
        action: Value,
    },

    /// Another player ended their turn.
    TurnEnded { from: Option<PlayerId> },

    /// Another player declared the game over.
    GameOver {
        from: Option<PlayerId>,
        result: Value,
    },

    Chat { player_name: String, text: String },

    /// A problem worth showing the player.
    Error(String),

    /// Answer to [`RelaySession::ping`](crate::RelaySession::ping).
    Pong { server_time: f64 },

    /// Answer to [`RelaySession::request_stats`](crate::RelaySession::request_stats).
    Stats(Stats),

    /// The socket is gone. Always the last event of a connection.
    Disconnected { reason: Option<String> },
}
