//! Per-connection handler: decode, dispatch, and write back.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   1. Spawn a writer task that drains the socket's outbound channel and
//!      pings the peer on an interval
//!   2. Loop: receive a frame → decode → dispatch by message kind
//!   3. On close, drop guards take the player out of its room
//!
//! Everything sent to this socket, replies included, goes through the
//! outbound channel. Replies to room requests are queued while the
//! registry lock is held, so they stay ordered with broadcasts.

use std::sync::Arc;
use std::time::Duration;

use republic_protocol::payload::{
    ErrorMessage, Pong, RoomCreated, RoomJoined, RoomRequest, RoomScoped,
};
use republic_protocol::{
    Envelope, MessageKind, PlayerId, PlayerInfo, RoomCode, now_timestamp,
};
use republic_room::{Frame, PlayerSender, RoomError, SocketHandle};
use republic_transport::{Connection, ConnectionId, TransportError};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::RelayError;
use crate::server::ServerState;

const DEFAULT_HOST_NAME: &str = "Host";
const DEFAULT_HOST_COLOR: &str = "red";
const DEFAULT_PLAYER_NAME: &str = "Player";
const DEFAULT_PLAYER_COLOR: &str = "blue";

/// Drop guard for one socket's share of the server state.
///
/// Counts the socket as connected while alive. On drop it uncounts it and,
/// if a player was seen on it, takes that player out of its room. Since
/// `Drop` is synchronous, the room cleanup is a fire-and-forget task.
struct ConnectionGuard {
    state: Arc<ServerState>,
    connection_id: ConnectionId,
    player_id: Option<PlayerId>,
}

impl ConnectionGuard {
    fn new(state: Arc<ServerState>, connection_id: ConnectionId) -> Self {
        state.connection_opened();
        Self {
            state,
            connection_id,
            player_id: None,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.connection_closed();
        tracing::info!(
            connection_id = %self.connection_id,
            remaining = self.state.connected(),
            "client disconnected"
        );

        let Some(player_id) = self.player_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let connection_id = self.connection_id;
        runtime.spawn(async move {
            let mut registry = state.registry.lock().await;
            registry.leave_connection(&player_id, connection_id);
        });
    }
}

/// Aborts the writer task when the handler exits, however it exits.
struct WriterGuard(JoinHandle<()>);

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Handles a single socket from accept to close.
pub(crate) async fn handle_connection<C: Connection>(
    conn: C,
    state: Arc<ServerState>,
    ping_interval: Duration,
) -> Result<(), RelayError> {
    let conn = Arc::new(conn);
    let connection_id = conn.id();
    let mut guard = ConnectionGuard::new(Arc::clone(&state), connection_id);
    tracing::debug!(%connection_id, "handling new connection");

    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let _writer = WriterGuard(tokio::spawn(write_loop(
        Arc::clone(&conn),
        outbound_rx,
        ping_interval,
    )));

    let mut client = Client {
        state: &state,
        outbound,
        connection_id,
        player_id: None,
    };

    loop {
        let text = match conn.recv().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!(%connection_id, "connection closed cleanly");
                break;
            }
            Err(TransportError::IdleTimeout(limit)) => {
                tracing::info!(
                    %connection_id,
                    idle_secs = limit.as_secs(),
                    "connection timed out"
                );
                let _ = conn.close().await;
                break;
            }
            Err(TransportError::InvalidFrame(reason)) => {
                tracing::debug!(%connection_id, %reason, "unreadable frame");
                client.reply(MessageKind::Error, &ErrorMessage::new(reason));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        client.handle_frame(&text).await;
        if guard.player_id.is_none() {
            guard.player_id = client.player_id.clone();
        }
    }

    Ok(())
}

/// Drains the outbound channel into the socket and keeps it alive with
/// pings. Ends when the socket fails or every sender is gone.
async fn write_loop<C: Connection>(
    conn: Arc<C>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    ping_interval: Duration,
) {
    let connection_id = conn.id();
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + ping_interval,
        ping_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!(%connection_id, error = %e, "send failed");
                    break;
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = conn.ping().await {
                    tracing::debug!(%connection_id, error = %e, "ping failed");
                    break;
                }
            }
        }
    }
}

/// What the reader knows about its socket.
struct Client<'a> {
    state: &'a ServerState,
    outbound: PlayerSender,
    connection_id: ConnectionId,
    /// The first `sender_id` seen on this socket.
    player_id: Option<PlayerId>,
}

impl Client<'_> {
    async fn handle_frame(&mut self, text: &str) {
        let envelope = match Envelope::from_json(text) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "failed to decode envelope"
                );
                let message = if e.is_malformed_json() {
                    "Invalid JSON".to_string()
                } else {
                    e.to_string()
                };
                self.reply(MessageKind::Error, &ErrorMessage::new(message));
                return;
            }
        };

        let Some(sender_id) = envelope.sender_id() else {
            self.reply(
                MessageKind::Error,
                &ErrorMessage::new("Missing sender_id"),
            );
            return;
        };

        let player_id = match &self.player_id {
            Some(id) => id.clone(),
            None => {
                tracing::info!(
                    connection_id = %self.connection_id,
                    player_id = %sender_id,
                    "player identified"
                );
                self.player_id = Some(sender_id.clone());
                sender_id.clone()
            }
        };

        match envelope.kind() {
            MessageKind::CreateRoom => self.create_room(&player_id, &envelope).await,
            MessageKind::JoinRoom => self.join_room(&player_id, &envelope).await,
            MessageKind::LeaveRoom => self.leave_room(&player_id).await,
            kind if kind.is_relayed() => {
                self.relay(&player_id, &envelope, text).await;
            }
            MessageKind::Ping => {
                self.reply(
                    MessageKind::Pong,
                    &Pong {
                        server_time: now_timestamp(),
                    },
                );
            }
            MessageKind::GetStats => {
                let stats = {
                    let registry = self.state.registry.lock().await;
                    self.state.stats(&registry)
                };
                self.reply(MessageKind::Stats, &stats);
            }
            kind => {
                tracing::warn!(%player_id, %kind, "unhandled message type");
            }
        }
    }

    async fn create_room(&self, player_id: &PlayerId, envelope: &Envelope) {
        let Some(request) = self.room_request(envelope) else {
            return;
        };
        let code = match RoomCode::parse(&request.room_code) {
            Ok(code) => code,
            Err(_) => {
                self.room_error(&RoomError::InvalidCode(request.room_code));
                return;
            }
        };
        let host = PlayerInfo {
            player_id: player_id.clone(),
            name: request
                .player_name
                .unwrap_or_else(|| DEFAULT_HOST_NAME.to_string()),
            color_key: request
                .color_key
                .unwrap_or_else(|| DEFAULT_HOST_COLOR.to_string()),
            is_host: true,
            is_ready: true,
        };

        let mut registry = self.state.registry.lock().await;
        match registry.create(code, self.socket(), host) {
            Ok(room) => {
                let room_code = room.code().clone();
                self.reply(MessageKind::RoomCreated, &RoomCreated { room_code });
            }
            Err(e) => self.room_error(&e),
        }
    }

    async fn join_room(&self, player_id: &PlayerId, envelope: &Envelope) {
        let Some(request) = self.room_request(envelope) else {
            return;
        };
        // A malformed code can never name a live room.
        let code = match RoomCode::parse(&request.room_code) {
            Ok(code) => code,
            Err(_) => {
                self.room_error(&RoomError::NotFound(request.room_code));
                return;
            }
        };
        let info = PlayerInfo {
            player_id: player_id.clone(),
            name: request
                .player_name
                .unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string()),
            color_key: request
                .color_key
                .unwrap_or_else(|| DEFAULT_PLAYER_COLOR.to_string()),
            is_host: false,
            is_ready: true,
        };

        let mut registry = self.state.registry.lock().await;
        match registry.join(&code, self.socket(), info) {
            Ok(outcome) => self.reply(
                MessageKind::RoomJoined,
                &RoomJoined {
                    room_code: outcome.room_code,
                    players: outcome.players,
                    assigned_color: outcome.assigned_color,
                },
            ),
            Err(e) => self.room_error(&e),
        }
    }

    async fn leave_room(&self, player_id: &PlayerId) {
        let outcome = self.state.registry.lock().await.leave(player_id);
        if outcome.is_none() {
            tracing::debug!(%player_id, "leave_room while not in a room");
        }
    }

    /// Forwards the frame, byte for byte, to everyone else in the room.
    async fn relay(&self, player_id: &PlayerId, envelope: &Envelope, text: &str) {
        let scoped: RoomScoped = envelope.payload().unwrap_or_default();
        let mut registry = self.state.registry.lock().await;

        let code = scoped
            .room_code
            .and_then(|raw| RoomCode::parse(&raw).ok())
            .or_else(|| registry.room_of(player_id).cloned());
        let Some(code) = code else {
            tracing::debug!(%player_id, kind = %envelope.kind(), "no room for message, dropped");
            return;
        };
        if !registry.touch(&code) {
            tracing::debug!(%player_id, room_code = %code, "unknown room, dropped");
            return;
        }
        if envelope.kind() == &MessageKind::GameStart {
            registry.start_game(&code);
        }

        let delivered = registry.broadcast(&code, &Frame::from(text), Some(player_id));
        tracing::trace!(
            %player_id,
            room_code = %code,
            kind = %envelope.kind(),
            delivered,
            "relayed"
        );
    }

    fn room_request(&self, envelope: &Envelope) -> Option<RoomRequest> {
        match envelope.payload() {
            Ok(request) => Some(request),
            Err(e) => {
                tracing::debug!(connection_id = %self.connection_id, error = %e, "bad room request");
                self.reply(MessageKind::Error, &ErrorMessage::new(e.to_string()));
                None
            }
        }
    }

    fn socket(&self) -> SocketHandle {
        SocketHandle::new(self.connection_id, self.outbound.clone())
    }

    fn room_error(&self, error: &RoomError) {
        tracing::info!(connection_id = %self.connection_id, %error, "room request refused");
        self.reply(MessageKind::RoomError, &ErrorMessage::new(error.to_string()));
    }

    /// Queues a relay-originated message for this socket.
    fn reply<T: Serialize>(&self, kind: MessageKind, payload: &T) {
        let text = match Envelope::new(kind, payload).and_then(|env| env.to_json()) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode reply");
                return;
            }
        };
        if self.outbound.send(Frame::from(text)).is_err() {
            tracing::debug!(connection_id = %self.connection_id, "reply dropped, writer gone");
        }
    }
}
