//! Core protocol types for the relay's wire format.
//!
//! Every type here travels "on the wire": it is serialized to JSON, sent
//! as one text frame, and deserialized on the other side.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Characters a room code may contain: upper-case letters and digits
/// without the easily-confused `0`, `1`, `I` and `O`.
pub const ROOM_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Every room code is exactly this many characters.
pub const ROOM_CODE_LEN: usize = 4;

/// Length of a generated player id.
const PLAYER_ID_LEN: usize = 16;

/// The fixed player colour palette, in reassignment order.
pub const COLOR_PALETTE: [&str; 4] = ["red", "blue", "green", "purple"];

/// Seconds since the Unix epoch, as carried in [`Envelope::timestamp`].
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's identity on the relay (the envelope's `sender_id`).
///
/// Clients generate one at random and keep it for the whole run, across
/// reconnects. The relay never assigns ids; it trusts what it is sent.
///
/// `Ord` matters: host migration promotes the lowest remaining id.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wraps an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random 16-character alphanumeric id.
    pub fn generate() -> Self {
        let id = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(PLAYER_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A validated, upper-case room code such as `WXYZ`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes `raw` to upper case and checks it is exactly
    /// [`ROOM_CODE_LEN`] characters from [`ROOM_CODE_ALPHABET`].
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        let valid = code.chars().count() == ROOM_CODE_LEN
            && code.chars().all(|c| ROOM_CODE_ALPHABET.contains(c));
        if valid {
            Ok(Self(code))
        } else {
            Err(ProtocolError::InvalidRoomCode(raw.to_string()))
        }
    }

    /// Draws a fresh random code. Collisions are the server's to report.
    pub fn generate() -> Self {
        let alphabet = ROOM_CODE_ALPHABET.as_bytes();
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The `type` tag of an envelope.
///
/// A closed set, plus [`MessageKind::Unknown`] carrying any tag this build
/// does not recognize, so an unexpected message can be logged and skipped
/// instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    // -- Room management --
    CreateRoom,
    JoinRoom,
    LeaveRoom,
    RoomCreated,
    RoomJoined,
    PlayerJoined,
    PlayerLeft,
    RoomError,
    HostChanged,

    // -- Game traffic (relayed verbatim) --
    GameStart,
    GameState,
    GameAction,
    TurnEnd,
    GameOver,

    // -- Utility --
    Ping,
    Pong,
    Chat,
    Error,
    GetStats,
    Stats,

    /// Any tag outside the set above.
    Unknown(String),
}

impl MessageKind {
    /// Every known kind, in wire-protocol order.
    pub const KNOWN: [MessageKind; 20] = [
        Self::CreateRoom,
        Self::JoinRoom,
        Self::LeaveRoom,
        Self::RoomCreated,
        Self::RoomJoined,
        Self::PlayerJoined,
        Self::PlayerLeft,
        Self::RoomError,
        Self::HostChanged,
        Self::GameStart,
        Self::GameState,
        Self::GameAction,
        Self::TurnEnd,
        Self::GameOver,
        Self::Ping,
        Self::Pong,
        Self::Chat,
        Self::Error,
        Self::GetStats,
        Self::Stats,
    ];

    /// The wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateRoom => "create_room",
            Self::JoinRoom => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::RoomCreated => "room_created",
            Self::RoomJoined => "room_joined",
            Self::PlayerJoined => "player_joined",
            Self::PlayerLeft => "player_left",
            Self::RoomError => "room_error",
            Self::HostChanged => "host_changed",
            Self::GameStart => "game_start",
            Self::GameState => "game_state",
            Self::GameAction => "game_action",
            Self::TurnEnd => "turn_end",
            Self::GameOver => "game_over",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Chat => "chat",
            Self::Error => "error",
            Self::GetStats => "get_stats",
            Self::Stats => "stats",
            Self::Unknown(tag) => tag,
        }
    }

    /// The replies to a `create_room` / `join_room` request.
    pub fn is_confirmation(&self) -> bool {
        matches!(self, Self::RoomCreated | Self::RoomJoined | Self::RoomError)
    }

    /// Kinds the relay forwards, untouched, to the rest of the room.
    pub fn is_relayed(&self) -> bool {
        matches!(
            self,
            Self::GameState
                | Self::GameAction
                | Self::TurnEnd
                | Self::GameStart
                | Self::GameOver
                | Self::Chat
        )
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|kind| kind.as_str() == tag)
            .cloned()
            .unwrap_or_else(|| Self::Unknown(tag.to_string()))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from(tag.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level message wrapper. Every frame on the wire is one Envelope.
///
/// ```text
/// {"type": "chat", "data": {...}, "sender_id": "aB3...", "timestamp": 1.7e9}
/// ```
///
/// Envelopes are immutable once built: construct with [`Envelope::new`]
/// or [`Envelope::empty`], optionally stamp a sender, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: MessageKind,

    /// Kind-specific payload; always a JSON object.
    #[serde(default, deserialize_with = "null_as_empty")]
    data: Map<String, Value>,

    /// Absent on relay-originated messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender_id: Option<PlayerId>,

    /// Seconds since the Unix epoch at construction.
    #[serde(default = "now_timestamp")]
    timestamp: f64,
}

fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Envelope {
    /// Builds an envelope whose `data` is `payload` serialized to a JSON
    /// object.
    pub fn new<T: Serialize>(
        kind: MessageKind,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        match serde_json::to_value(payload).map_err(ProtocolError::Encode)? {
            Value::Object(data) => Ok(Self {
                kind,
                data,
                sender_id: None,
                timestamp: now_timestamp(),
            }),
            other => Err(ProtocolError::InvalidMessage(format!(
                "{kind} payload must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builds an envelope with an empty `data` object.
    pub fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            data: Map::new(),
            sender_id: None,
            timestamp: now_timestamp(),
        }
    }

    /// Stamps the sender.
    pub fn with_sender(mut self, sender_id: PlayerId) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    /// Overrides the construction timestamp.
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn sender_id(&self) -> Option<&PlayerId> {
        self.sender_id.as_ref()
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Reads `data` as the typed payload `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(
            |source| ProtocolError::InvalidPayload {
                kind: self.kind.to_string(),
                source,
            },
        )
    }
}

// =========================================================================
// Tests
// =========================================================================
