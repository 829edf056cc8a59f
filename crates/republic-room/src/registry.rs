//! Room registry: creates rooms, routes players, and migrates hosts.

use std::collections::HashMap;
use std::time::Duration;

use republic_protocol::payload::{HostChanged, PlayerJoined, PlayerLeft};
use republic_protocol::{Envelope, MessageKind, PlayerId, PlayerInfo, RoomCode};
use republic_transport::ConnectionId;
use serde::Serialize;
use tokio::time::Instant;

use crate::room::{Frame, Room, SocketHandle};
use crate::{RoomConfig, RoomError};

/// Lifetime counters. They only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms_created: u64,
    pub games_played: u64,
}

/// Result of a successful [`RoomRegistry::join`].
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub room_code: RoomCode,
    /// Everyone in the room except the joiner, in player-id order.
    pub players: Vec<PlayerInfo>,
    /// The colour the joiner actually got.
    pub assigned_color: String,
    /// The joiner was already a member and only its socket was replaced.
    pub rejoined: bool,
}

/// Result of a player leaving a room.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub room_code: RoomCode,
    pub player: PlayerInfo,
    /// The room became empty and was removed.
    pub room_closed: bool,
    /// The player who inherited the host role, if the leaver was host.
    pub new_host: Option<PlayerId>,
}

/// Every live room and which room each player is in.
///
/// Both maps change together inside each method, so callers share a
/// registry behind one lock. A player is in at most one room at a time.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    config: RoomConfig,

    /// Live rooms, keyed by code.
    rooms: HashMap<RoomCode, Room>,

    /// Which room each player is currently in.
    player_rooms: HashMap<PlayerId, RoomCode>,

    stats: RegistryStats,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            stats: RegistryStats::default(),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Opens a room under `code` with `host` as its only member.
    ///
    /// The host is forced to `is_host` and `is_ready`. If the host was in
    /// another room it leaves that room first.
    ///
    /// # Errors
    /// Returns `RoomError::AlreadyExists` if a live room uses `code`. The
    /// existing room is left untouched.
    pub fn create(
        &mut self,
        code: RoomCode,
        socket: SocketHandle,
        host: PlayerInfo,
    ) -> Result<&Room, RoomError> {
        if self.rooms.contains_key(&code) {
            return Err(RoomError::AlreadyExists(code));
        }

        let host_id = host.player_id.clone();
        self.leave(&host_id);

        let room = Room::new(code.clone(), socket, host);
        self.player_rooms.insert(host_id.clone(), code.clone());
        self.stats.rooms_created += 1;
        tracing::info!(room_code = %code, %host_id, "room created");

        Ok(self.rooms.entry(code).or_insert(room))
    }

    /// Adds a player to an existing room.
    ///
    /// The requested `color_key` is kept when free, otherwise swapped for
    /// the first unused palette colour. Every other member is sent
    /// `player_joined`. If the player already belongs to this room, only
    /// its socket is replaced: this is how a reconnecting client picks up
    /// its old seat.
    ///
    /// # Errors
    /// `NotFound` if no room uses `code`, `Full` at `max_players`, and
    /// `GameInProgress` once the host has started the game.
    pub fn join(
        &mut self,
        code: &RoomCode,
        socket: SocketHandle,
        mut info: PlayerInfo,
    ) -> Result<JoinOutcome, RoomError> {
        let max = self.config.max_players;
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.to_string()))?;

        let player_id = info.player_id.clone();
        if room.contains(&player_id) {
            room.replace_socket(&player_id, socket);
            let assigned_color = room
                .player(&player_id)
                .map(|p| p.color_key.clone())
                .unwrap_or(info.color_key);
            tracing::info!(room_code = %code, %player_id, "player rejoined");
            return Ok(JoinOutcome {
                room_code: code.clone(),
                players: others(room, &player_id),
                assigned_color,
                rejoined: true,
            });
        }

        if room.len() >= max {
            return Err(RoomError::Full {
                code: code.clone(),
                max,
            });
        }
        if room.game_started() {
            return Err(RoomError::GameInProgress(code.clone()));
        }

        info.color_key = self
            .config
            .assign_color(&info.color_key, room.players().map(|p| p.color_key.as_str()));
        info.is_host = false;
        info.is_ready = true;

        self.leave(&player_id);

        // The earlier borrow ended when the player left their old room.
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.to_string()))?;
        let players = room.players().cloned().collect();
        let assigned_color = info.color_key.clone();

        if let Some(frame) = encode(
            MessageKind::PlayerJoined,
            &PlayerJoined {
                player: info.clone(),
            },
        ) {
            room.broadcast(&frame, None);
        }
        room.insert(socket, info);
        self.player_rooms.insert(player_id.clone(), code.clone());
        tracing::info!(
            room_code = %code,
            %player_id,
            players = room.len(),
            "player joined"
        );

        Ok(JoinOutcome {
            room_code: code.clone(),
            players,
            assigned_color,
            rejoined: false,
        })
    }

    /// Removes a player from whatever room it is in.
    ///
    /// Remaining members are sent `player_left`. An empty room is removed;
    /// otherwise, if the host left, the lowest remaining player id becomes
    /// host and everyone is sent `host_changed`. Returns `None` if the
    /// player was not in a room.
    pub fn leave(&mut self, player_id: &PlayerId) -> Option<LeaveOutcome> {
        let code = self.player_rooms.remove(player_id)?;
        let room = self.rooms.get_mut(&code)?;
        let player = room.remove(player_id)?;

        if room.is_empty() {
            self.rooms.remove(&code);
            tracing::info!(room_code = %code, %player_id, "room closed, last player left");
            return Some(LeaveOutcome {
                room_code: code,
                player,
                room_closed: true,
                new_host: None,
            });
        }

        if let Some(frame) = encode(
            MessageKind::PlayerLeft,
            &PlayerLeft {
                player_id: player_id.clone(),
            },
        ) {
            room.broadcast(&frame, None);
        }

        let mut new_host = None;
        if room.host_id() == player_id {
            new_host = room.promote_next_host();
            if let Some(new_host_id) = &new_host {
                tracing::info!(room_code = %code, %new_host_id, "host migrated");
                if let Some(frame) = encode(
                    MessageKind::HostChanged,
                    &HostChanged {
                        new_host_id: new_host_id.clone(),
                    },
                ) {
                    room.broadcast(&frame, None);
                }
            }
        }

        tracing::info!(
            room_code = %code,
            %player_id,
            players = room.len(),
            "player left"
        );
        Some(LeaveOutcome {
            room_code: code,
            player,
            room_closed: false,
            new_host,
        })
    }

    /// Like [`leave`](Self::leave), but only if the player's membership is
    /// still bound to `connection_id`. A socket that closes after its
    /// player has reconnected elsewhere leaves the new seat alone.
    pub fn leave_connection(
        &mut self,
        player_id: &PlayerId,
        connection_id: ConnectionId,
    ) -> Option<LeaveOutcome> {
        let code = self.player_rooms.get(player_id)?;
        let bound = self.rooms.get(code)?.connection_of(player_id)?;
        if bound != connection_id {
            tracing::debug!(
                %player_id,
                %connection_id,
                %bound,
                "stale socket closed, membership kept"
            );
            return None;
        }
        self.leave(player_id)
    }

    /// Sends a frame to every member of a room except `exclude`. Returns
    /// how many members it was queued for; zero if the room is unknown.
    pub fn broadcast(
        &self,
        code: &RoomCode,
        frame: &Frame,
        exclude: Option<&PlayerId>,
    ) -> usize {
        self.rooms
            .get(code)
            .map_or(0, |room| room.broadcast(frame, exclude))
    }

    /// Marks a room as active now. Returns `false` if the room is unknown.
    pub fn touch(&mut self, code: &RoomCode) -> bool {
        match self.rooms.get_mut(code) {
            Some(room) => {
                room.touch();
                true
            }
            None => false,
        }
    }

    /// Marks the room's game as started. Returns `false` if the room is
    /// unknown. Only the first start of a room counts as a game played.
    pub fn start_game(&mut self, code: &RoomCode) -> bool {
        let Some(room) = self.rooms.get_mut(code) else {
            return false;
        };
        if room.mark_started() {
            self.stats.games_played += 1;
            tracing::info!(room_code = %code, players = room.len(), "game started");
        }
        true
    }

    /// Removes every room idle for longer than `threshold` as of `now`,
    /// along with its players' index entries. Returns the removed codes.
    pub fn reclaim_stale(
        &mut self,
        now: Instant,
        threshold: Duration,
    ) -> Vec<RoomCode> {
        let stale: Vec<RoomCode> = self
            .rooms
            .values()
            .filter(|room| now.saturating_duration_since(room.last_activity()) > threshold)
            .map(|room| room.code().clone())
            .collect();

        for code in &stale {
            if let Some(room) = self.rooms.remove(code) {
                for player_id in room.player_ids() {
                    self.player_rooms.remove(player_id);
                }
                tracing::info!(
                    room_code = %code,
                    players = room.len(),
                    idle_secs = now.saturating_duration_since(room.last_activity()).as_secs(),
                    "reclaimed stale room"
                );
            }
        }
        stale
    }

    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// The code of the room a player is currently in, if any.
    pub fn room_of(&self, player_id: &PlayerId) -> Option<&RoomCode> {
        self.player_rooms.get(player_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Players currently seated in some room.
    pub fn player_count(&self) -> usize {
        self.player_rooms.len()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}

fn others(room: &Room, player_id: &PlayerId) -> Vec<PlayerInfo> {
    room.players()
        .filter(|p| &p.player_id != player_id)
        .cloned()
        .collect()
}

/// Serializes a relay-originated message. These payloads are plain structs,
/// so failure here is a bug: it is logged and the message is skipped.
fn encode<T: Serialize>(kind: MessageKind, payload: &T) -> Option<Frame> {
    match Envelope::new(kind, payload).and_then(|env| env.to_json()) {
        Ok(text) => Some(Frame::from(text)),
        Err(err) => {
            tracing::error!(%err, "failed to encode relay message");
            None
        }
    }
}
