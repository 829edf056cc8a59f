//! A single room: its members, their sockets, and its host.
//!
//! A room never touches a socket directly. Each member is reached through
//! a [`SocketHandle`], the sending half of the channel that member's
//! connection handler drains into its own socket.

use std::collections::BTreeMap;
use std::sync::Arc;

use republic_protocol::{PlayerId, PlayerInfo, RoomCode};
use republic_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One already-serialized text frame. Shared, so fan-out never copies it.
pub type Frame = Arc<str>;

/// Channel sender for delivering frames to a player's socket.
pub type PlayerSender = mpsc::UnboundedSender<Frame>;

/// How the registry reaches one live socket.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    connection_id: ConnectionId,
    sender: PlayerSender,
}

impl SocketHandle {
    pub fn new(connection_id: ConnectionId, sender: PlayerSender) -> Self {
        Self {
            connection_id,
            sender,
        }
    }

    /// The socket this handle writes to.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queues a frame for the socket. Returns `false` if the socket's
    /// handler has already gone away.
    pub fn send(&self, frame: Frame) -> bool {
        self.sender.send(frame).is_ok()
    }
}

#[derive(Debug)]
struct Member {
    socket: SocketHandle,
    info: PlayerInfo,
}

/// A live room.
///
/// Members are keyed by player id in one ordered map, so the socket and the
/// [`PlayerInfo`] of a player can never get out of step, and "lowest
/// remaining id" is simply the first key.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    host_id: PlayerId,
    members: BTreeMap<PlayerId, Member>,
    game_started: bool,
    created_at: Instant,
    last_activity: Instant,
}

impl Room {
    pub(crate) fn new(
        code: RoomCode,
        host_socket: SocketHandle,
        mut host_info: PlayerInfo,
    ) -> Self {
        let now = Instant::now();
        host_info.is_host = true;
        host_info.is_ready = true;
        let host_id = host_info.player_id.clone();
        let mut members = BTreeMap::new();
        members.insert(
            host_id.clone(),
            Member {
                socket: host_socket,
                info: host_info,
            },
        );
        Self {
            code,
            host_id,
            members,
            game_started: false,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn host_id(&self) -> &PlayerId {
        &self.host_id
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Number of players in the room.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.members.contains_key(player_id)
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&PlayerInfo> {
        self.members.get(player_id).map(|m| &m.info)
    }

    /// All members, in player-id order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerInfo> + Clone {
        self.members.values().map(|m| &m.info)
    }

    /// Member ids, in player-id order.
    pub fn player_ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.members.keys()
    }

    /// The socket a member is currently reached through.
    pub fn connection_of(&self, player_id: &PlayerId) -> Option<ConnectionId> {
        self.members.get(player_id).map(|m| m.socket.connection_id())
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn mark_started(&mut self) -> bool {
        let first = !self.game_started;
        self.game_started = true;
        first
    }

    pub(crate) fn insert(&mut self, socket: SocketHandle, info: PlayerInfo) {
        self.members
            .insert(info.player_id.clone(), Member { socket, info });
        self.touch();
    }

    /// Points an existing member at a new socket.
    pub(crate) fn replace_socket(
        &mut self,
        player_id: &PlayerId,
        socket: SocketHandle,
    ) -> bool {
        match self.members.get_mut(player_id) {
            Some(member) => {
                member.socket = socket;
                self.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, player_id: &PlayerId) -> Option<PlayerInfo> {
        let member = self.members.remove(player_id)?;
        self.touch();
        Some(member.info)
    }

    /// Hands the host role to the lowest remaining player id. Returns the
    /// new host, or `None` if the room is empty.
    pub(crate) fn promote_next_host(&mut self) -> Option<PlayerId> {
        let (next_id, member) = self.members.iter_mut().next()?;
        member.info.is_host = true;
        self.host_id = next_id.clone();
        Some(next_id.clone())
    }

    /// Queues `frame` for every member except `exclude`. A member whose
    /// socket is gone is logged and skipped. Returns how many were reached.
    pub(crate) fn broadcast(
        &self,
        frame: &Frame,
        exclude: Option<&PlayerId>,
    ) -> usize {
        let mut delivered = 0;
        for (player_id, member) in &self.members {
            if Some(player_id) == exclude {
                continue;
            }
            if member.socket.send(Arc::clone(frame)) {
                delivered += 1;
            } else {
                tracing::warn!(
                    room_code = %self.code,
                    %player_id,
                    "error forwarding to player, socket gone"
                );
            }
        }
        delivered
    }
}
