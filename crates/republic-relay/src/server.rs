//! `RelayServer` builder and accept loop.
//!
//! This is the entry point for running a relay. It ties together all the
//! layers: transport → protocol → room registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use republic_protocol::now_timestamp;
use republic_protocol::payload::Stats;
use republic_room::RoomRegistry;
use republic_transport::WebSocketListener;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::RelayError;
use crate::config::RelayConfig;
use crate::handler::handle_connection;
use crate::maintenance::spawn_maintenance;

/// Shared server state passed to each connection handler task.
///
/// The registry sits behind one lock so its room map and player index
/// always change together. No network I/O happens while it is held.
pub(crate) struct ServerState {
    pub(crate) registry: Mutex<RoomRegistry>,
    connected: AtomicUsize,
    total_connections: AtomicU64,
    started: Instant,
    started_unix: f64,
}

impl ServerState {
    pub(crate) fn new(registry: RoomRegistry) -> Self {
        Self {
            registry: Mutex::new(registry),
            connected: AtomicUsize::new(0),
            total_connections: AtomicU64::new(0),
            started: Instant::now(),
            started_unix: now_timestamp(),
        }
    }

    pub(crate) fn connection_opened(&self) {
        self.connected.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connected.fetch_sub(1, Ordering::Relaxed);
    }

    /// Sockets currently open.
    pub(crate) fn connected(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sockets accepted since start.
    pub(crate) fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Live gauges and lifetime counters, as sent in `stats`.
    pub(crate) fn stats(&self, registry: &RoomRegistry) -> Stats {
        let lifetime = registry.stats();
        Stats {
            active_rooms: registry.room_count(),
            connected_players: self.connected(),
            uptime: self.started.elapsed().as_secs_f64(),
            total_connections: self.total_connections(),
            total_rooms_created: lifetime.rooms_created,
            total_games_played: lifetime.games_played,
            server_start_time: self.started_unix,
        }
    }
}

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,ignore
/// use republic_relay::prelude::*;
///
/// let server = RelayServer::builder()
///     .bind("0.0.0.0:8765")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct RelayServerBuilder {
    config: RelayConfig,
}

impl RelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
        }
    }

    /// Replaces the whole configuration. A later [`bind`](Self::bind)
    /// still overrides its address.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Binds the listener.
    ///
    /// # Errors
    /// Returns `RelayError::Transport` if the address cannot be bound.
    pub async fn build(self) -> Result<RelayServer, RelayError> {
        let listener =
            WebSocketListener::bind(&self.config.bind_addr, self.config.transport())
                .await?;

        let state = Arc::new(ServerState::new(RoomRegistry::new(
            self.config.room.clone(),
        )));

        Ok(RelayServer {
            listener,
            state,
            config: self.config,
        })
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound relay.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RelayServer {
    listener: WebSocketListener,
    state: Arc<ServerState>,
    config: RelayConfig,
}

impl RelayServer {
    /// Creates a new builder.
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs the accept loop and the maintenance tasks.
    ///
    /// Spawns a handler task for each accepted socket; the WebSocket
    /// handshake runs in that task, so a slow peer never stalls the loop.
    /// A failed accept is logged and the loop carries on. Runs until the
    /// future is dropped, which also stops maintenance.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let _maintenance = spawn_maintenance(Arc::clone(&self.state), &self.config);
        tracing::info!(bind_addr = %self.config.bind_addr, "relay running");

        loop {
            match self.listener.accept().await {
                Ok(pending) => {
                    let remote = pending.remote_addr();
                    tracing::info!(%remote, "new connection");
                    let state = Arc::clone(&self.state);
                    let ping_interval = self.config.ping_interval;
                    tokio::spawn(async move {
                        let conn = match pending.handshake().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::info!(%remote, error = %e, "handshake failed");
                                return;
                            }
                        };
                        if let Err(e) =
                            handle_connection(conn, state, ping_interval).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
