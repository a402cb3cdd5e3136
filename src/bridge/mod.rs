/// Stdio to WebSocket bridge
///
/// MCP hosts speak newline-delimited JSON-RPC over a child process's stdin
/// and stdout. The bridge forwards each valid input line to the vault
/// server as one WebSocket text message and writes each message from the
/// server back out followed by a newline. Lines read before the connection
/// is open are queued and sent in order once it opens.

pub mod lines;

pub use lines::LineBuffer;

use std::future::Future;

use serde_json::json;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::mcp::protocol::JsonRpcResponse;
use crate::ws::{OutboundQueue, Session, WsError};

/// Errors that end a bridge run
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("WebSocket error: {0}")]
    Transport(#[from] WsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server closed the connection")]
    PeerClosed,

    #[error("Unexpected reply from server: {0}")]
    UnexpectedReply(String),
}

/// Where the bridge connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl BridgeConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

async fn recv_next(session: &mut Option<Session<TcpStream>>) -> Result<Option<String>, WsError> {
    match session {
        Some(session) => session.recv().await,
        None => std::future::pending().await,
    }
}

/// Run the bridge until input ends, the server goes away, or `shutdown` fires
///
/// Returns `Ok(())` on end of input or shutdown, after closing the
/// connection. A transport failure or a close from the server is an error.
pub async fn run<R, W, F>(
    config: &BridgeConfig,
    mut input: R,
    mut output: W,
    shutdown: F,
) -> Result<(), BridgeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let connect = Session::connect(&config.host, config.port, &config.path);
    tokio::pin!(connect);
    tokio::pin!(shutdown);

    let mut session: Option<Session<TcpStream>> = None;
    let mut queue = OutboundQueue::new();
    let mut lines = LineBuffer::new();
    let mut chunk = vec![0u8; 16 * 1024];

    info!("Connecting to {}", config.url());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, closing connection");
                if let Some(session) = session.as_mut() {
                    session.close().await;
                }
                return Ok(());
            }
            connected = &mut connect, if session.is_none() => {
                let mut connected = connected?;
                let flushed = queue.flush(&mut connected).await?;
                info!("Connected to {} ({} queued message(s) sent)", config.url(), flushed);
                session = Some(connected);
            }
            read = input.read(&mut chunk) => {
                let read = read?;
                if read == 0 {
                    info!("stdin closed");
                    if let Some(session) = session.as_mut() {
                        session.close().await;
                    }
                    return Ok(());
                }
                for line in lines.push(&chunk[..read]) {
                    debug!("Received from stdin: {}", line);
                    queue.enqueue(line, session.as_mut()).await?;
                }
            }
            message = recv_next(&mut session) => {
                let Some(text) = message? else {
                    return Err(BridgeError::PeerClosed);
                };
                debug!("Received from server: {}", text);
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }
    }
}

/// Check that a server is reachable and answering `ping`
pub async fn probe(config: &BridgeConfig) -> Result<(), BridgeError> {
    let mut session = Session::connect(&config.host, config.port, &config.path).await?;
    let request = json!({"jsonrpc": "2.0", "id": "status", "method": "ping"});
    session.send_text(&request.to_string()).await?;

    let reply = session.recv().await?.ok_or(BridgeError::PeerClosed)?;
    session.close().await;

    let response: JsonRpcResponse = serde_json::from_str(&reply)
        .map_err(|_| BridgeError::UnexpectedReply(reply.clone()))?;
    if response.result().is_some() {
        Ok(())
    } else {
        Err(BridgeError::UnexpectedReply(reply))
    }
}
