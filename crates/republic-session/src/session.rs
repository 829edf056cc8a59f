//! The client side of a relay connection.
//!
//! A [`RelaySession`] owns one socket at a time and a background receive
//! task. Requests that expect an answer (`create_room`, `join_room`) park a
//! oneshot in a single pending slot; the receive task fills it when the
//! matching confirmation arrives. All other traffic becomes
//! [`SessionEvent`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use republic_protocol::payload::{
    Chat, ErrorMessage, GameAction, GameOver, GameStart, GameState, HostChanged,
    PlayerJoined, PlayerLeft, Pong, RoomCreated, RoomJoined, RoomRequest,
    RoomScoped, Stats, TurnEnd,
};
use republic_protocol::{
    Envelope, MessageKind, PlayerId, PlayerInfo, ProtocolError, RoomCode,
};
use republic_transport::{ClientConnection, Connection, TransportError};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{ConnectionState, SessionConfig, SessionError, SessionEvent};

/// A `create_room` or `join_room` waiting for its answer.
struct PendingRequest {
    expects: MessageKind,
    reply: oneshot::Sender<Envelope>,
}

/// Everything the caller can observe, changed together.
#[derive(Debug, Default)]
struct SessionState {
    connection: ConnectionState,
    room_code: Option<RoomCode>,
    is_host: bool,
    player_name: String,
    players: BTreeMap<PlayerId, PlayerInfo>,
}

impl SessionState {
    fn clear_room(&mut self) {
        self.room_code = None;
        self.is_host = false;
        self.players.clear();
    }
}

struct Inner {
    config: SessionConfig,
    player_id: PlayerId,
    state: Mutex<SessionState>,
    conn: Mutex<Option<Arc<ClientConnection>>>,
    pending: Mutex<Option<PendingRequest>>,
    /// Serializes dial attempts.
    connect_lock: Mutex<()>,
    /// One room request in flight at a time.
    request_lock: Mutex<()>,
    receive_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    events: mpsc::Sender<SessionEvent>,
}

/// Result of a successful [`RelaySession::join_room`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    pub room_code: RoomCode,
    /// The colour the relay gave us. Differs from the request when another
    /// player already had it.
    pub assigned_color: String,
}

/// A client connection to the relay.
///
/// The player id is generated once, here, and reused by every reconnect of
/// this session so the relay can hand back the same seat.
///
/// # Example
///
/// ```rust,no_run
/// use republic_session::{RelaySession, SessionConfig, SessionEvent};
///
/// # async fn run() -> Result<(), republic_session::SessionError> {
/// let (session, mut events) = RelaySession::new(SessionConfig::default());
/// let code = session.create_room("Alice", "red").await?;
/// println!("share this code: {code}");
///
/// while let Some(event) = events.recv().await {
///     if let SessionEvent::Disconnected { .. } = event {
///         break;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct RelaySession {
    inner: Arc<Inner>,
}

impl RelaySession {
    /// Creates a disconnected session and the receiver for its events.
    pub fn new(config: SessionConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, events_rx) =
            mpsc::channel(config.event_channel_capacity.max(1));
        let inner = Inner {
            config,
            player_id: PlayerId::generate(),
            state: Mutex::new(SessionState::default()),
            conn: Mutex::new(None),
            pending: Mutex::new(None),
            connect_lock: Mutex::new(()),
            request_lock: Mutex::new(()),
            receive_task: std::sync::Mutex::new(None),
            events,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
        )
    }

    // -----------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------

    /// Dials the relay, retrying with a fixed delay.
    ///
    /// Succeeds immediately if already connected.
    ///
    /// # Errors
    /// Returns `SessionError::ConnectFailed` once every attempt has failed;
    /// the session is then in [`ConnectionState::Error`].
    pub async fn connect(&self) -> Result<(), SessionError> {
        let _dialing = self.inner.connect_lock.lock().await;
        {
            let mut state = self.inner.state.lock().await;
            if state.connection.is_connected() {
                return Ok(());
            }
            state.connection = ConnectionState::Connecting;
        }

        let config = &self.inner.config;
        let attempts = config.reconnect_attempts.max(1);
        for attempt in 1..=attempts {
            tracing::info!(url = %config.url, attempt, attempts, "connecting to relay");
            let dial = republic_transport::connect(&config.url, &config.transport);
            match tokio::time::timeout(config.connect_timeout, dial).await {
                Ok(Ok(conn)) => {
                    self.attach(conn).await;
                    tracing::info!(
                        url = %config.url,
                        player_id = %self.inner.player_id,
                        "connected to relay"
                    );
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "connection attempt failed");
                }
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        timeout_secs = config.connect_timeout.as_secs(),
                        "connection attempt timed out"
                    );
                }
            }
            if attempt < attempts {
                tokio::time::sleep(config.reconnect_delay).await;
            }
        }

        self.inner.state.lock().await.connection = ConnectionState::Error;
        let err = SessionError::ConnectFailed { attempts };
        self.inner.emit(SessionEvent::Error(err.to_string()));
        Err(err)
    }

    async fn attach(&self, conn: ClientConnection) {
        let conn = Arc::new(conn);
        *self.inner.conn.lock().await = Some(Arc::clone(&conn));
        self.inner.state.lock().await.connection = ConnectionState::Connected;

        let task = tokio::spawn(receive_loop(Arc::clone(&self.inner), conn));
        let previous = self
            .inner
            .receive_task
            .lock()
            .ok()
            .and_then(|mut slot| slot.replace(task));
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Closes the connection and forgets the room. Safe to call at any
    /// time, any number of times.
    pub async fn disconnect(&self) {
        self.inner.abort_receive_task();
        let conn = self.inner.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "close failed");
            }
        }
        self.inner.pending.lock().await.take();

        let was_connected = {
            let mut state = self.inner.state.lock().await;
            let was = state.connection != ConnectionState::Disconnected;
            state.connection = ConnectionState::Disconnected;
            state.clear_room();
            was
        };
        if was_connected {
            tracing::info!("disconnected from relay");
            self.inner.emit(SessionEvent::Disconnected { reason: None });
        }
    }

    // -----------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------

    /// Creates a room under a freshly generated code and becomes its host.
    /// Connects first if needed.
    ///
    /// # Errors
    /// `Room` with the relay's message if it refused (for example, the
    /// code was taken), `Timeout` if it did not answer. The session stays
    /// connected in both cases.
    pub async fn create_room(
        &self,
        player_name: &str,
        color_key: &str,
    ) -> Result<RoomCode, SessionError> {
        self.ensure_connected().await?;
        let code = RoomCode::generate();
        let request = RoomRequest {
            room_code: code.to_string(),
            player_name: Some(player_name.to_string()),
            color_key: Some(color_key.to_string()),
        };

        let reply = self
            .request(MessageKind::CreateRoom, &request, MessageKind::RoomCreated)
            .await?;
        let created: RoomCreated = self.confirmation(&reply)?;

        let mut state = self.inner.state.lock().await;
        state.clear_room();
        state.connection = ConnectionState::InRoom;
        state.room_code = Some(created.room_code.clone());
        state.is_host = true;
        state.player_name = player_name.to_string();
        state.players.insert(
            self.inner.player_id.clone(),
            PlayerInfo {
                player_id: self.inner.player_id.clone(),
                name: player_name.to_string(),
                color_key: color_key.to_string(),
                is_host: true,
                is_ready: true,
            },
        );
        tracing::info!(room_code = %created.room_code, "room created");
        Ok(created.room_code)
    }

    /// Joins the room with `room_code` (any case). Connects first if
    /// needed.
    ///
    /// # Errors
    /// `Room` with the relay's message if the room does not exist, is full,
    /// or has started; `Timeout` if the relay did not answer. The session
    /// stays connected in both cases.
    pub async fn join_room(
        &self,
        room_code: &str,
        player_name: &str,
        color_key: &str,
    ) -> Result<JoinedRoom, SessionError> {
        self.ensure_connected().await?;
        let request = RoomRequest {
            room_code: room_code.trim().to_uppercase(),
            player_name: Some(player_name.to_string()),
            color_key: Some(color_key.to_string()),
        };

        let reply = self
            .request(MessageKind::JoinRoom, &request, MessageKind::RoomJoined)
            .await?;
        let joined: RoomJoined = self.confirmation(&reply)?;

        let me = &self.inner.player_id;
        let mut state = self.inner.state.lock().await;
        state.clear_room();
        state.connection = ConnectionState::InRoom;
        state.room_code = Some(joined.room_code.clone());
        state.player_name = player_name.to_string();
        state.players.insert(
            me.clone(),
            PlayerInfo {
                player_id: me.clone(),
                name: player_name.to_string(),
                color_key: joined.assigned_color.clone(),
                is_host: false,
                is_ready: true,
            },
        );
        for player in joined.players.into_iter().filter(|p| &p.player_id != me) {
            state.players.insert(player.player_id.clone(), player);
        }
        tracing::info!(
            room_code = %joined.room_code,
            players = state.players.len(),
            "joined room"
        );

        Ok(JoinedRoom {
            room_code: joined.room_code,
            assigned_color: joined.assigned_color,
        })
    }

    /// Leaves the current room and returns to [`ConnectionState::Connected`].
    pub async fn leave_room(&self) -> Result<(), SessionError> {
        let code = {
            let mut state = self.inner.state.lock().await;
            let code = state.room_code.take();
            state.clear_room();
            if state.connection.is_in_room() {
                state.connection = ConnectionState::Connected;
            }
            code
        };
        match code {
            Some(code) => {
                self.send(
                    MessageKind::LeaveRoom,
                    &RoomScoped {
                        room_code: Some(code.to_string()),
                    },
                )
                .await
            }
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------
    // Game traffic
    // -----------------------------------------------------------------

    /// Sends a full state snapshot to the rest of the room.
    pub async fn send_game_state(&self, game_state: Value) -> Result<(), SessionError> {
        let Some(room_code) = self.active_room().await else {
            return Ok(());
        };
        self.send(MessageKind::GameState, &GameState { room_code, game_state })
            .await
    }

    /// Sends one action to the rest of the room.
    pub async fn send_game_action(&self, action: Value) -> Result<(), SessionError> {
        let Some(room_code) = self.active_room().await else {
            return Ok(());
        };
        self.send(MessageKind::GameAction, &GameAction { room_code, action })
            .await
    }

    pub async fn send_turn_end(&self) -> Result<(), SessionError> {
        let Some(room_code) = self.active_room().await else {
            return Ok(());
        };
        self.send(MessageKind::TurnEnd, &TurnEnd { room_code }).await
    }

    pub async fn send_chat(&self, text: &str) -> Result<(), SessionError> {
        let (room_code, player_name) = {
            let state = self.inner.state.lock().await;
            match (&state.room_code, state.connection.is_in_room()) {
                (Some(code), true) => (code.clone(), state.player_name.clone()),
                _ => return Ok(()),
            }
        };
        let chat = Chat {
            room_code,
            text: text.to_string(),
            player_name,
        };
        self.send(MessageKind::Chat, &chat).await
    }

    /// Announces the end of the game to the rest of the room.
    pub async fn send_game_over(&self, result: Value) -> Result<(), SessionError> {
        let Some(room_code) = self.active_room().await else {
            return Ok(());
        };
        self.send(MessageKind::GameOver, &GameOver { room_code, result })
            .await
    }

    /// Starts the game for everyone in the room. Host only: anyone else
    /// gets a warning in the log and nothing is sent.
    pub async fn start_game(&self, initial_state: Value) -> Result<(), SessionError> {
        let room_code = {
            let mut state = self.inner.state.lock().await;
            if !state.is_host {
                tracing::warn!("only the host can start the game");
                return Ok(());
            }
            let Some(code) = state.room_code.clone() else {
                tracing::warn!("start_game outside a room");
                return Ok(());
            };
            state.connection = ConnectionState::GameActive;
            code
        };
        tracing::info!(%room_code, "starting game");
        self.send(
            MessageKind::GameStart,
            &GameStart {
                room_code,
                initial_state,
            },
        )
        .await
    }

    /// Asks the relay for a `pong`, reported as [`SessionEvent::Pong`].
    pub async fn ping(&self) -> Result<(), SessionError> {
        self.send(MessageKind::Ping, &serde_json::Map::new()).await
    }

    /// Asks the relay for its counters, reported as [`SessionEvent::Stats`].
    pub async fn request_stats(&self) -> Result<(), SessionError> {
        self.send(MessageKind::GetStats, &serde_json::Map::new()).await
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// This session's id, stable across reconnects.
    pub fn player_id(&self) -> &PlayerId {
        &self.inner.player_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().await.connection
    }

    pub async fn room_code(&self) -> Option<RoomCode> {
        self.inner.state.lock().await.room_code.clone()
    }

    pub async fn is_host(&self) -> bool {
        self.inner.state.lock().await.is_host
    }

    /// Everyone in the room, ourselves included, in player-id order.
    pub async fn players(&self) -> Vec<PlayerInfo> {
        self.inner.state.lock().await.players.values().cloned().collect()
    }

    pub async fn player_count(&self) -> usize {
        self.inner.state.lock().await.players.len()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await.is_connected()
    }

    pub async fn is_in_room(&self) -> bool {
        self.connection_state().await.is_in_room()
    }

    pub async fn is_game_active(&self) -> bool {
        self.connection_state().await == ConnectionState::GameActive
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected().await {
            return Ok(());
        }
        self.connect().await
    }

    /// The room to address game traffic to, if game traffic is allowed now.
    async fn active_room(&self) -> Option<RoomCode> {
        let state = self.inner.state.lock().await;
        if state.connection.is_in_room() {
            state.room_code.clone()
        } else {
            None
        }
    }

    async fn send<T: Serialize>(
        &self,
        kind: MessageKind,
        payload: &T,
    ) -> Result<(), SessionError> {
        let conn = self
            .inner
            .conn
            .lock()
            .await
            .clone()
            .ok_or(SessionError::NotConnected)?;
        let text = Envelope::new(kind, payload)?
            .with_sender(self.inner.player_id.clone())
            .to_json()?;
        conn.send(&text).await?;
        Ok(())
    }

    /// Sends a room request and waits for its confirmation or `room_error`.
    async fn request<T: Serialize>(
        &self,
        kind: MessageKind,
        payload: &T,
        expects: MessageKind,
    ) -> Result<Envelope, SessionError> {
        let _in_flight = self.inner.request_lock.lock().await;
        let (reply, answer) = oneshot::channel();
        *self.inner.pending.lock().await = Some(PendingRequest { expects, reply });

        if let Err(e) = self.send(kind, payload).await {
            self.inner.pending.lock().await.take();
            return Err(e);
        }

        let limit = self.inner.config.confirmation_timeout;
        match tokio::time::timeout(limit, answer).await {
            Ok(Ok(envelope)) => Ok(envelope),
            // The receive loop ended and dropped the slot.
            Ok(Err(_)) => Err(SessionError::NotConnected),
            Err(_) => {
                self.inner.pending.lock().await.take();
                let err = SessionError::Timeout(limit);
                self.inner.emit(SessionEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Reads a confirmation, turning `room_error` into `SessionError::Room`.
    fn confirmation<T: serde::de::DeserializeOwned>(
        &self,
        reply: &Envelope,
    ) -> Result<T, SessionError> {
        if reply.kind() == &MessageKind::RoomError {
            let message = reply
                .payload::<ErrorMessage>()
                .map(|e| e.message)
                .unwrap_or_default();
            tracing::info!(%message, "room request refused");
            self.inner.emit(SessionEvent::Error(message.clone()));
            return Err(SessionError::Room(message));
        }
        Ok(reply.payload()?)
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.inner.abort_receive_task();
    }
}

impl Inner {
    fn abort_receive_task(&self) {
        let task = self.receive_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Waits for room in the event channel. Used for everything the relay
    /// sends; while the channel is full the socket is not read.
    async fn deliver(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("event channel closed, receiver dropped");
        }
    }

    /// Queues a locally raised event without waiting. A full channel drops
    /// the event.
    fn emit(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(event = ?dropped, "event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Handles one frame from the relay.
    async fn dispatch(&self, text: &str) {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "invalid message from relay");
                return;
            }
        };

        if envelope.kind().is_confirmation() {
            self.resolve_pending(envelope).await;
            return;
        }

        if let Err(e) = self.handle_event(&envelope).await {
            tracing::warn!(kind = %envelope.kind(), error = %e, "malformed message from relay");
        }
    }

    async fn resolve_pending(&self, envelope: Envelope) {
        let mut pending = self.pending.lock().await;
        let matches = pending.as_ref().is_some_and(|p| {
            envelope.kind() == &p.expects || envelope.kind() == &MessageKind::RoomError
        });
        if !matches {
            tracing::debug!(kind = %envelope.kind(), "confirmation with no waiter dropped");
            return;
        }
        if let Some(request) = pending.take() {
            let _ = request.reply.send(envelope);
        }
    }

    async fn handle_event(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        let from = envelope.sender_id().cloned();
        let event = match envelope.kind() {
            MessageKind::PlayerJoined => {
                let PlayerJoined { player } = envelope.payload()?;
                let mut state = self.state.lock().await;
                state.players.insert(player.player_id.clone(), player.clone());
                tracing::info!(player_id = %player.player_id, name = %player.name, "player joined");
                SessionEvent::PlayerJoined(player)
            }
            MessageKind::PlayerLeft => {
                let PlayerLeft { player_id } = envelope.payload()?;
                self.state.lock().await.players.remove(&player_id);
                tracing::info!(%player_id, "player left");
                SessionEvent::PlayerLeft(player_id)
            }
            MessageKind::HostChanged => {
                let HostChanged { new_host_id } = envelope.payload()?;
                let is_self = new_host_id == self.player_id;
                let mut state = self.state.lock().await;
                for player in state.players.values_mut() {
                    player.is_host = player.player_id == new_host_id;
                }
                state.is_host = is_self;
                tracing::info!(%new_host_id, is_self, "host changed");
                SessionEvent::HostChanged {
                    new_host_id,
                    is_self,
                }
            }
            MessageKind::GameStart => {
                let start: GameStart = envelope.payload()?;
                let mut state = self.state.lock().await;
                if state.connection.is_in_room() {
                    state.connection = ConnectionState::GameActive;
                }
                SessionEvent::GameStarted {
                    from,
                    initial_state: start.initial_state,
                }
            }
            MessageKind::GameState => {
                let snapshot: GameState = envelope.payload()?;
                SessionEvent::GameState {
                    from,
                    game_state: snapshot.game_state,
                }
            }
            MessageKind::GameAction => {
                let action: GameAction = envelope.payload()?;
                SessionEvent::GameAction {
                    from,
                    action: action.action,
                }
            }
            MessageKind::TurnEnd => SessionEvent::TurnEnded { from },
            MessageKind::GameOver => {
                let over: GameOver = envelope.payload()?;
                SessionEvent::GameOver {
                    from,
                    result: over.result,
                }
            }
            MessageKind::Chat => {
                let chat: Chat = envelope.payload()?;
                SessionEvent::Chat {
                    player_name: chat.player_name,
                    text: chat.text,
                }
            }
            MessageKind::Error => {
                let error: ErrorMessage = envelope.payload()?;
                tracing::warn!(message = %error.message, "relay reported an error");
                SessionEvent::Error(error.message)
            }
            MessageKind::Pong => {
                let pong: Pong = envelope.payload()?;
                SessionEvent::Pong {
                    server_time: pong.server_time,
                }
            }
            MessageKind::Stats => SessionEvent::Stats(envelope.payload::<Stats>()?),
            kind => {
                tracing::debug!(%kind, "ignoring message");
                return Ok(());
            }
        };
        self.deliver(event).await;
        Ok(())
    }
}

/// Reads frames until the socket ends, pinging the relay on an interval.
///
/// On exit the session becomes `Disconnected` (clean close) or `Error`,
/// any waiting request is released, and `Disconnected` is emitted. If the
/// session has already moved on to a newer socket, none of that happens.
async fn receive_loop(inner: Arc<Inner>, conn: Arc<ClientConnection>) {
    let period = inner.config.ping_interval;
    let mut keepalive =
        tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome: Result<(), TransportError> = loop {
        tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(text)) => inner.dispatch(&text).await,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
            _ = keepalive.tick() => {
                if let Err(e) = conn.ping().await {
                    break Err(e);
                }
            }
        }
    };

    {
        let mut current = inner.conn.lock().await;
        let still_current = current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &conn));
        if !still_current {
            return;
        }
        current.take();
    }
    inner.pending.lock().await.take();

    let reason = {
        let mut state = inner.state.lock().await;
        state.clear_room();
        match &outcome {
            Ok(()) => {
                tracing::info!("connection closed by relay");
                state.connection = ConnectionState::Disconnected;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "connection to relay lost");
                state.connection = ConnectionState::Error;
                Some(e.to_string())
            }
        }
    };

    inner.deliver(SessionEvent::Disconnected { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (RelaySession, mpsc::Receiver<SessionEvent>) {
        RelaySession::new(SessionConfig::default())
    }

    async fn seat(session: &RelaySession, connection: ConnectionState, host: bool) {
        let me = session.player_id().clone();
        let mut state = session.inner.state.lock().await;
        state.connection = connection;
        state.room_code = Some(RoomCode::parse("WXYZ").unwrap());
        state.is_host = host;
        state.players.insert(
            me.clone(),
            PlayerInfo {
                player_id: me,
                name: "Me".into(),
                color_key: "red".into(),
                is_host: host,
                is_ready: true,
            },
        );
    }

    #[test]
    fn test_new_generates_sixteen_char_player_id() {
        let (session, _events) = session();
        let id = session.player_id().as_str();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_new_session_is_disconnected() {
        let (session, _events) = session();
        assert_eq!(session.connection_state().await, ConnectionState::Disconnected);
        assert!(!session.is_connected().await);
        assert!(session.room_code().await.is_none());
        assert_eq!(session.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_player_joined_updates_roster() {
        let (session, mut events) = session();
        seat(&session, ConnectionState::InRoom, true).await;

        session
            .inner
            .dispatch(
                r#"{"type":"player_joined","data":{"player":{"player_id":"bob","name":"Bob","color_key":"blue","is_host":false,"is_ready":true}}}"#,
            )
            .await;

        assert_eq!(session.player_count().await, 2);
        match events.try_recv().unwrap() {
            SessionEvent::PlayerJoined(player) => assert_eq!(player.name, "Bob"),
            other => panic!("expected PlayerJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_host_changed_to_self_sets_host() {
        let (session, mut events) = session();
        seat(&session, ConnectionState::InRoom, false).await;
        let me = session.player_id().clone();

        let frame = format!(r#"{{"type":"host_changed","data":{{"new_host_id":"{me}"}}}}"#);
        session.inner.dispatch(&frame).await;

        assert!(session.is_host().await);
        assert!(session.players().await[0].is_host);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::HostChanged {
                new_host_id: me,
                is_self: true
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_game_start_activates_game() {
        let (session, mut events) = session();
        seat(&session, ConnectionState::InRoom, false).await;

        session
            .inner
            .dispatch(
                r#"{"type":"game_start","data":{"room_code":"WXYZ","initial_state":{"turn":1}},"sender_id":"host"}"#,
            )
            .await;

        assert!(session.is_game_active().await);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::GameStarted {
                from: Some(PlayerId::new("host")),
                initial_state: serde_json::json!({"turn": 1}),
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_late_confirmation_is_dropped() {
        let (session, mut events) = session();

        session
            .inner
            .dispatch(r#"{"type":"room_created","data":{"room_code":"WXYZ"}}"#)
            .await;

        assert!(events.try_recv().is_err());
        assert!(session.inner.pending.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_confirmation_fills_pending_slot() {
        let (session, _events) = session();
        let (reply, answer) = oneshot::channel();
        *session.inner.pending.lock().await = Some(PendingRequest {
            expects: MessageKind::RoomJoined,
            reply,
        });

        session
            .inner
            .dispatch(r#"{"type":"room_error","data":{"message":"Room ABCD not found."}}"#)
            .await;

        let envelope = answer.await.unwrap();
        assert_eq!(envelope.kind(), &MessageKind::RoomError);
    }

    #[tokio::test]
    async fn test_dispatch_unexpected_confirmation_keeps_waiter() {
        let (session, _events) = session();
        let (reply, _answer) = oneshot::channel();
        *session.inner.pending.lock().await = Some(PendingRequest {
            expects: MessageKind::RoomJoined,
            reply,
        });

        session
            .inner
            .dispatch(r#"{"type":"room_created","data":{"room_code":"WXYZ"}}"#)
            .await;

        assert!(session.inner.pending.lock().await.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_chat_defaults_name() {
        let (session, mut events) = session();

        session
            .inner
            .dispatch(r#"{"type":"chat","data":{"room_code":"WXYZ","text":"gg"}}"#)
            .await;

        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Chat {
                player_name: "Unknown".into(),
                text: "gg".into()
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_garbage_is_ignored() {
        let (session, mut events) = session();
        session.inner.dispatch("not json").await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_game_non_host_is_noop() {
        let (session, _events) = session();
        seat(&session, ConnectionState::InRoom, false).await;

        session.start_game(serde_json::json!({})).await.unwrap();

        assert_eq!(session.connection_state().await, ConnectionState::InRoom);
    }

    #[tokio::test]
    async fn test_send_game_state_outside_room_is_noop() {
        let (session, _events) = session();
        session
            .send_game_state(serde_json::json!({"hp": 1}))
            .await
            .unwrap();
        session.send_turn_end().await.unwrap();
        session.send_chat("hi").await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_without_connection_is_not_connected() {
        let (session, _events) = session();
        let result = session.ping().await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_twice_emits_nothing_when_idle() {
        let (session, mut events) = session();
        session.disconnect().await;
        session.disconnect().await;
        assert!(events.try_recv().is_err());
        assert_eq!(session.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_leave_room_clears_room_state() {
        let (session, _events) = session();
        seat(&session, ConnectionState::GameActive, true).await;

        // No socket, so the leave message fails to send after the local
        // state has already been cleared.
        let result = session.leave_room().await;

        assert!(matches!(result, Err(SessionError::NotConnected)));
        assert!(session.room_code().await.is_none());
        assert!(!session.is_host().await);
        assert_eq!(session.connection_state().await, ConnectionState::Connected);
    }
}
