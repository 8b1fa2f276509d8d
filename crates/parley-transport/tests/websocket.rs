//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener and dial it with
//! [`WebSocketConnection::connect`], verifying that frames actually flow
//! both ways and that a clean close is observed as `Ok(None)`.

#[cfg(feature = "websocket")]
mod websocket {
    use parley_transport::{
        Connection, Transport, WebSocketConnection, WebSocketTransport,
    };

    /// Binds a transport on a random port and returns it with its address.
    async fn bind_transport() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport
            .local_addr()
            .expect("should have local addr")
            .to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind_transport().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let client_conn = WebSocketConnection::connect(&addr)
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.expect("task should complete");

        // Both sides get distinct, valid ids.
        assert!(server_conn.id().into_inner() > 0);
        assert_ne!(server_conn.id(), client_conn.id());

        // An accepted connection knows the remote endpoint; a dialed one
        // does not (the server reports it during rendezvous instead).
        assert!(server_conn.peer_addr().is_some());
        assert!(client_conn.peer_addr().is_none());

        // --- Server sends, client receives ---
        server_conn
            .send(b"hello from server")
            .await
            .expect("send should succeed");
        let received = client_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from server");

        // --- Client sends, server receives ---
        client_conn
            .send(b"hello from client")
            .await
            .expect("send should succeed");
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind_transport().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let client_conn = WebSocketConnection::connect(&addr)
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.unwrap();

        client_conn.close().await.expect("close should succeed");

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }
}
