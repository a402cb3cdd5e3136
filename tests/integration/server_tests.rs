/// WebSocket server tests with a real client session
use std::time::Duration;

use bytes::BytesMut;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vault_mcp::ws::handshake::header_block_len;
use vault_mcp::ws::ClientHandshake;
use vault_mcp::Session;

use super::{spawn_server, start_server};

#[cfg(test)]
mod server_tests {
    use super::*;

    async fn request(session: &mut Session<tokio::net::TcpStream>, request: Value) -> Value {
        session.send_text(&request.to_string()).await.unwrap();
        let reply = session.recv().await.unwrap().expect("reply");
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_and_ping() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;

        let mut client = Session::connect("127.0.0.1", addr.port(), "/").await.unwrap();
        assert!(client.is_open());

        client
            .send_text(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        client.send_text(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await.unwrap();

        // The notification produces no reply, so the first message is the pong
        let reply = client.recv().await.unwrap().unwrap();
        assert_eq!(reply, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);

        client.close().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_note_round_trip_over_socket() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;
        let mut client = Session::connect("127.0.0.1", addr.port(), "/").await.unwrap();

        let written = request(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                   "params": {"name": "write_note",
                              "arguments": {"path": "daily/today.md", "content": "# Today\nship it"}}}),
        )
        .await;
        assert!(written["result"]["content"][0]["text"].as_str().unwrap().contains("daily/today.md"));
        assert!(dir.path().join("daily/today.md").exists());

        let read = request(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "read_note", "arguments": {"path": "daily/today.md"}}}),
        )
        .await;
        let text = read["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<String>(text).unwrap(), "# Today\nship it");

        let escaped = request(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "read_note", "arguments": {"path": "../outside.md"}}}),
        )
        .await;
        assert_eq!(escaped["error"]["code"], -32000);
        assert_eq!(escaped["error"]["data"]["isError"], true);

        client.close().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_connection() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;
        let mut client = Session::connect("127.0.0.1", addr.port(), "/").await.unwrap();

        client.send_text("{not json").await.unwrap();
        let parse_error: Value = serde_json::from_str(&client.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(parse_error["error"]["code"], -32700);
        assert_eq!(parse_error["id"], 0);

        let listed = request(&mut client, json!({"jsonrpc": "2.0", "id": 9, "method": "tools/list"})).await;
        assert_eq!(listed["result"]["tools"].as_array().unwrap().len(), 6);

        client.close().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;

        let mut first = Session::connect("127.0.0.1", addr.port(), "/").await.unwrap();
        let mut second = Session::connect("127.0.0.1", addr.port(), "/").await.unwrap();
        assert_eq!(server.connection_count().await, 2);

        let a = request(&mut first, json!({"jsonrpc": "2.0", "id": "a", "method": "ping"})).await;
        let b = request(&mut second, json!({"jsonrpc": "2.0", "id": "b", "method": "ping"})).await;
        assert_eq!(a["id"], "a");
        assert_eq!(b["id"], "b");

        first.close().await;
        let c = request(&mut second, json!({"jsonrpc": "2.0", "id": "c", "method": "ping"})).await;
        assert_eq!(c["id"], "c");

        second.close().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_live_clients() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;
        let mut client = Session::connect("127.0.0.1", addr.port(), "/").await.unwrap();

        server.stop().await;
        assert!(server.is_stopped());
        assert_eq!(server.connection_count().await, 0);

        assert_eq!(client.recv().await.unwrap(), None);
        assert!(!client.is_open());

        // Stopping twice is harmless
        server.stop().await;
    }

    #[tokio::test]
    async fn test_close_frame_written_before_serve_returns() {
        let dir = tempdir().unwrap();
        let (server, addr, serving) = spawn_server(dir.path()).await;

        // Upgrade by hand so the raw bytes after the handshake are visible
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let handshake = ClientHandshake::new(addr.to_string(), "/");
        stream.write_all(handshake.request().as_bytes()).await.unwrap();
        let mut buf = BytesMut::new();
        let header_len = loop {
            stream.read_buf(&mut buf).await.unwrap();
            if let Some(len) = handshake.parse_response(&buf).unwrap() {
                break len;
            }
        };
        let mut after_handshake = buf.split_off(header_len).to_vec();
        assert!(header_block_len(&buf).is_some());

        server.stop().await;
        let outcome = tokio::time::timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
        assert!(outcome.is_ok());

        // The server sent an empty close frame, then shut its side
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut after_handshake))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after_handshake, vec![0x88, 0x00]);
    }

    #[tokio::test]
    async fn test_stop_does_not_wait_on_silent_handshake() {
        let dir = tempdir().unwrap();
        let (server, addr, serving) = spawn_server(dir.path()).await;

        // Connected, but never sends an upgrade request
        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(5), server.stop()).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), serving).await.unwrap().unwrap();
        assert!(outcome.is_ok());
    }
}
