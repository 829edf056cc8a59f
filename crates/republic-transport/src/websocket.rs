//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, TransportConfig, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// The client side of a relay connection, as returned by [`connect`].
pub type ClientConnection = WebSocketConnection<MaybeTlsStream<TcpStream>>;

fn ws_config(config: &TransportConfig) -> WebSocketConfig {
    let mut ws = WebSocketConfig::default();
    ws.max_message_size = Some(config.max_frame_size);
    ws.max_frame_size = Some(config.max_frame_size);
    ws
}

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Listens for incoming WebSocket connections.
pub struct WebSocketListener {
    listener: TcpListener,
    config: TransportConfig,
}

impl WebSocketListener {
    /// Binds a new listener to the given address.
    pub async fn bind(
        addr: &str,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener, config })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// The WebSocket handshake is not done here; call
    /// [`PendingConnection::handshake`] on the result, typically from the
    /// task that will own the connection.
    pub async fn accept(&mut self) -> Result<PendingConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(PendingConnection {
            stream,
            addr,
            config: self.config.clone(),
        })
    }
}

/// An accepted TCP connection that has not completed the WebSocket
/// handshake yet.
pub struct PendingConnection {
    stream: TcpStream,
    addr: SocketAddr,
    config: TransportConfig,
}

impl PendingConnection {
    pub fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Completes the WebSocket upgrade.
    ///
    /// # Errors
    /// Returns `TransportError::AcceptFailed` if the peer sends a bad
    /// upgrade request or none within
    /// [`TransportConfig::handshake_timeout`].
    pub async fn handshake(
        self,
    ) -> Result<WebSocketConnection<TcpStream>, TransportError> {
        let Self {
            stream,
            addr,
            config,
        } = self;
        let upgrade = tokio_tungstenite::accept_async_with_config(
            stream,
            Some(ws_config(&config)),
        );
        let ws = match tokio::time::timeout(config.handshake_timeout, upgrade).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                return Err(TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                )));
            }
            Err(_) => {
                return Err(TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no WebSocket upgrade from {addr}"),
                )));
            }
        };

        let conn = WebSocketConnection::new(ws, &config);
        tracing::debug!(id = %conn.id, %addr, "accepted WebSocket connection");
        Ok(conn)
    }
}

/// Dials a relay at `url` (`ws://` or `wss://`).
pub async fn connect(
    url: &str,
    config: &TransportConfig,
) -> Result<ClientConnection, TransportError> {
    let (ws, _response) = tokio_tungstenite::connect_async_with_config(
        url,
        Some(ws_config(config)),
        false,
    )
    .await
    .map_err(|e| {
        TransportError::ConnectFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;

    let conn = WebSocketConnection::new(ws, config);
    tracing::debug!(id = %conn.id, url, "connected to relay");
    Ok(conn)
}

/// A single WebSocket connection.
///
/// The socket is split into its write and read halves, each behind its own
/// lock, so a reader parked in [`Connection::recv`] never blocks writers.
pub struct WebSocketConnection<S> {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    idle_timeout: Option<std::time::Duration>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(ws: WebSocketStream<S>, config: &TransportConfig) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: next_id(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            idle_timeout: config.idle_timeout,
        }
    }

    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn next_message(
        &self,
        stream: &mut SplitStream<WebSocketStream<S>>,
    ) -> Result<
        Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        TransportError,
    > {
        match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| TransportError::IdleTimeout(limit)),
            None => Ok(stream.next().await),
        }
    }
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.send_message(Message::text(text.to_owned())).await
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match self.next_message(&mut stream).await? {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map(Some)
                        .map_err(|e| {
                            TransportError::InvalidFrame(e.to_string())
                        });
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.send_message(Message::Ping(Default::default())).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
