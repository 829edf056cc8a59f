//! The `data` object of each message kind.
//!
//! Fields the relay or client may legitimately omit are `#[serde(default)]`
//! so a sparse message still parses. Game state, actions, and results are
//! opaque [`Value`]s: the relay never looks inside them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PlayerId, RoomCode};

/// One member of a room as every client sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub name: String,
    pub color_key: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_ready: bool,
}

/// `create_room` and `join_room`.
///
/// Name and colour are optional on the wire; the relay fills in its own
/// defaults depending on which request it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRequest {
    #[serde(default)]
    pub room_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_key: Option<String>,
}

/// `room_created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomCreated {
    pub room_code: RoomCode,
}

/// `room_joined`: everyone already in the room, and the colour the joiner
/// actually got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomJoined {
    pub room_code: RoomCode,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
    pub assigned_color: String,
}

/// `player_joined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub player: PlayerInfo,
}

/// `player_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub player_id: PlayerId,
}

/// `host_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostChanged {
    pub new_host_id: PlayerId,
}

/// `room_error` and `error`: a single human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub message: String,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The only field the relay reads from relayed game traffic and
/// `leave_room`: which room it is meant for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomScoped {
    #[serde(default)]
    pub room_code: Option<String>,
}

/// `game_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStart {
    pub room_code: RoomCode,
    #[serde(default)]
    pub initial_state: Value,
}

/// `game_state`: a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub room_code: RoomCode,
    #[serde(default)]
    pub game_state: Value,
}

/// `game_action`: one incremental action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    pub room_code: RoomCode,
    #[serde(default)]
    pub action: Value,
}

/// `turn_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEnd {
    pub room_code: RoomCode,
}

/// `game_over`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOver {
    pub room_code: RoomCode,
    #[serde(default)]
    pub result: Value,
}

/// `chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub room_code: RoomCode,
    #[serde(default)]
    pub text: String,
    #[serde(default = "unknown_name")]
    pub player_name: String,
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

/// `pong`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub server_time: f64,
}

/// `stats`: live gauges plus lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub active_rooms: usize,
    pub connected_players: usize,
    /// Seconds since the relay started.
    pub uptime: f64,
    #[serde(default)]
    pub total_connections: u64,
    #[serde(default)]
    pub total_rooms_created: u64,
    #[serde(default)]
    pub total_games_played: u64,
    /// Unix seconds at relay start.
    #[serde(default)]
    pub server_start_time: f64,
}
