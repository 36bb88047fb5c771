//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use wordfall_transport::{
        Connection, ConnectionReceiver, ConnectionSender, Transport, WebSocketConnection,
        WebSocketTransport,
    };

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn pair() -> (WebSocketConnection, Client) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("bound address");

        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        (server.await.expect("accept task"), client)
    }

    #[tokio::test]
    async fn test_split_halves_send_and_receive() {
        let (conn, mut client) = pair().await;
        assert!(conn.id().into_inner() > 0);
        let (mut tx, mut rx) = conn.split();

        tx.send_text(r#"{"type":"heartbeatAck"}"#.into())
            .await
            .expect("send should succeed");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"type":"heartbeatAck"}"#);

        client.send(Message::text("from text")).await.unwrap();
        client
            .send(Message::Binary(b"from binary".to_vec().into()))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), b"from text");
        assert_eq!(rx.recv().await.unwrap().unwrap(), b"from binary");

        tx.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_sending_while_a_receive_is_pending() {
        let (conn, mut client) = pair().await;
        let (mut tx, mut rx) = conn.split();

        // The read half parks in recv; the write half must not be blocked by it.
        let reader = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), tx.send_text("tick".into()))
            .await
            .expect("send must not wait for the reader")
            .unwrap();
        assert_eq!(client.next().await.unwrap().unwrap().into_text().unwrap().as_str(), "tick");

        client.send(Message::text("done")).await.unwrap();
        assert_eq!(reader.await.unwrap().unwrap().unwrap(), b"done");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_client_close() {
        let (conn, mut client) = pair().await;
        let (_tx, mut rx) = conn.split();

        client.send(Message::Close(None)).await.unwrap();

        let result = rx.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }
}
