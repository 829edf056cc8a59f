//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on a random loopback port and talk to it
//! with a plain `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use republic_transport::{
        Connection, TransportConfig, TransportError, WebSocketConnection,
        WebSocketListener, connect,
    };
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn listener(config: TransportConfig) -> (WebSocketListener, String) {
        let listener = WebSocketListener::bind("127.0.0.1:0", config)
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        (listener, addr)
    }

    async fn accept_pair(
        config: TransportConfig,
    ) -> (WebSocketConnection<TcpStream>, ClientWs) {
        let (mut listener, addr) = listener(config).await;
        let server = tokio::spawn(async move {
            listener
                .accept()
                .await
                .expect("should accept")
                .handshake()
                .await
                .expect("handshake should succeed")
        });
        let (client, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .expect("client should connect");
        let conn = server.await.expect("task should complete");
        (conn, client)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (server_conn, mut client_ws) =
            accept_pair(TransportConfig::default()).await;

        assert!(server_conn.id().into_inner() > 0);

        server_conn
            .send("hello from server")
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::text("hello from server"));

        client_ws
            .send(Message::text("hello from client"))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, "hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_accepts_utf8_binary_frames() {
        let (server_conn, mut client_ws) =
            accept_pair(TransportConfig::default()).await;

        client_ws
            .send(Message::Binary(b"{\"type\":\"ping\"}".to_vec().into()))
            .await
            .unwrap();

        let received = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(received, "{\"type\":\"ping\"}");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (server_conn, mut client_ws) =
            accept_pair(TransportConfig::default()).await;

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_recv_rejects_oversized_frame() {
        let config = TransportConfig {
            max_frame_size: 1024,
            ..TransportConfig::default()
        };
        let (server_conn, mut client_ws) = accept_pair(config).await;

        let big = "x".repeat(4096);
        // The client may or may not see the send fail depending on timing.
        let _ = client_ws.send(Message::text(big)).await;

        let result = server_conn.recv().await;
        assert!(
            matches!(result, Err(TransportError::ReceiveFailed(_))),
            "oversized frame must be rejected, got {result:?}"
        );
    }

    #[tokio::test]
    async fn test_websocket_recv_times_out_when_idle() {
        let config = TransportConfig {
            idle_timeout: Some(Duration::from_millis(50)),
            ..TransportConfig::default()
        };
        let (server_conn, _client_ws) = accept_pair(config).await;

        let result = server_conn.recv().await;
        assert!(matches!(result, Err(TransportError::IdleTimeout(_))));
    }

    #[tokio::test]
    async fn test_send_does_not_wait_for_pending_recv() {
        let (server_conn, mut client_ws) =
            accept_pair(TransportConfig::default()).await;
        let server_conn = std::sync::Arc::new(server_conn);

        let reader = {
            let conn = std::sync::Arc::clone(&server_conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), server_conn.send("hi"))
            .await
            .expect("send must not block behind recv")
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::text("hi"));

        client_ws.send(Message::text("bye")).await.unwrap();
        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some("bye"));
    }

    #[tokio::test]
    async fn test_connect_dials_listener() {
        let (mut listener, addr) = listener(TransportConfig::default()).await;
        let server = tokio::spawn(async move {
            listener
                .accept()
                .await
                .expect("should accept")
                .handshake()
                .await
                .expect("handshake should succeed")
        });

        let client =
            connect(&format!("ws://{addr}"), &TransportConfig::default())
                .await
                .expect("should connect");
        let server_conn = server.await.unwrap();

        client.send("from client").await.unwrap();
        assert_eq!(
            server_conn.recv().await.unwrap().as_deref(),
            Some("from client")
        );
        assert_ne!(client.id(), server_conn.id());
    }

    #[tokio::test]
    async fn test_handshake_silent_peer_times_out() {
        let config = TransportConfig {
            handshake_timeout: Duration::from_millis(100),
            ..TransportConfig::default()
        };
        let (mut listener, addr) = listener(config).await;

        // Plain TCP, never sends the upgrade request.
        let silent = TcpStream::connect(addr.as_str()).await.unwrap();
        let pending = listener.accept().await.expect("tcp accept");
        assert_eq!(pending.remote_addr(), silent.local_addr().unwrap());

        let result = pending.handshake().await;
        assert!(matches!(result, Err(TransportError::AcceptFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let (listener, addr) = listener(TransportConfig::default()).await;
        drop(listener);

        let result =
            connect(&format!("ws://{addr}"), &TransportConfig::default()).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
