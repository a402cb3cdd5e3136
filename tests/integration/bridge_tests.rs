/// Stdio bridge tests against a live server
use std::time::Duration;

use serde_json::Value;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use vault_mcp::{bridge, BridgeConfig, BridgeError};

use super::{closed_port, start_server};

fn config(port: u16) -> BridgeConfig {
    BridgeConfig {
        host: "127.0.0.1".to_string(),
        port,
        path: "/".to_string(),
    }
}

#[cfg(test)]
mod bridge_tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_are_forwarded_in_order() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;

        let (mut stdin, bridge_in) = tokio::io::duplex(64 * 1024);
        let (bridge_out, stdout) = tokio::io::duplex(64 * 1024);
        let bridge = tokio::spawn(async move {
            bridge::run(&config(addr.port()), bridge_in, bridge_out, std::future::pending()).await
        });

        // Written before the connection is likely open, so these get queued
        stdin
            .write_all(b"this is not json\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        stdin
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();

        let mut replies = BufReader::new(stdout).lines();
        let first: Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        let second: Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(first["result"], serde_json::json!({}));
        assert_eq!(second["id"], 2);
        assert!(second["result"]["tools"].is_array());

        // End of input closes the bridge cleanly
        drop(stdin);
        let outcome = tokio::time::timeout(Duration::from_secs(5), bridge).await.unwrap().unwrap();
        assert!(outcome.is_ok());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;

        let (mut stdin, bridge_in) = tokio::io::duplex(1024);
        let (bridge_out, stdout) = tokio::io::duplex(1024);
        let _bridge = tokio::spawn(async move {
            bridge::run(&config(addr.port()), bridge_in, bridge_out, std::future::pending()).await
        });

        stdin.write_all(b"{\"jsonrpc\":\"2.0\",").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stdin.write_all(b"\"id\":7,\"method\":\"ping\"}\n").await.unwrap();

        let mut replies = BufReader::new(stdout).lines();
        let reply: Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], 7);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_server_close_ends_bridge_with_error() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;

        let (mut stdin, bridge_in) = tokio::io::duplex(1024);
        let (bridge_out, stdout) = tokio::io::duplex(1024);
        let bridge = tokio::spawn(async move {
            bridge::run(&config(addr.port()), bridge_in, bridge_out, std::future::pending()).await
        });

        // A reply proves the connection is open before the server goes away
        stdin.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n").await.unwrap();
        let mut replies = BufReader::new(stdout).lines();
        replies.next_line().await.unwrap().unwrap();

        server.stop().await;

        let outcome = tokio::time::timeout(Duration::from_secs(5), bridge).await.unwrap().unwrap();
        assert!(matches!(outcome, Err(BridgeError::PeerClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_bridge() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;

        let (_stdin, bridge_in) = tokio::io::duplex(1024);
        let (bridge_out, _stdout) = tokio::io::duplex(1024);
        let (trigger, signal) = oneshot::channel::<()>();
        let bridge = tokio::spawn(async move {
            let shutdown = async {
                let _ = signal.await;
            };
            bridge::run(&config(addr.port()), bridge_in, bridge_out, shutdown).await
        });

        trigger.send(()).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), bridge).await.unwrap().unwrap();
        assert!(outcome.is_ok());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let port = closed_port().await;

        let (_stdin, bridge_in) = tokio::io::duplex(1024);
        let (bridge_out, _stdout) = tokio::io::duplex(1024);
        let outcome = bridge::run(&config(port), bridge_in, bridge_out, std::future::pending()).await;

        assert!(matches!(outcome, Err(BridgeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_probe_reports_running_and_stopped() {
        let dir = tempdir().unwrap();
        let (server, addr) = start_server(dir.path()).await;

        assert!(bridge::probe(&config(addr.port())).await.is_ok());
        server.stop().await;

        let port = closed_port().await;
        assert!(bridge::probe(&config(port)).await.is_err());
    }
}
