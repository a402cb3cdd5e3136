/// WebSocket MCP server
///
/// This module implements the server side of the transport:
/// 1. Accepts TCP connections and upgrades them to WebSocket
/// 2. Feeds each text message to the dispatcher
/// 3. Sends the response, if any, back on the same connection
///
/// Live connections are tracked in a registry owned by the server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::mcp::dispatch::Dispatcher;
use crate::ws::Session;
use crate::ServerError;

type SessionRegistry = Arc<Mutex<HashMap<Uuid, SocketAddr>>>;

/// MCP server that accepts many concurrent WebSocket clients
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    sessions: SessionRegistry,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Accept connections on `listener` until `stop` is called
    ///
    /// Returns once every connection task has finished, so close frames
    /// are written before the caller tears down the runtime.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("MCP server listening on ws://{}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer).await,
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }

        self.tasks.close();
        self.tasks.wait().await;
        info!("MCP server stopped");
        Ok(())
    }

    async fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let id = Uuid::new_v4();
        self.sessions.lock().await.insert(id, peer);
        info!("Client {} connected from {}", id, peer);

        let _ = stream.set_nodelay(true);
        let dispatcher = Arc::clone(&self.dispatcher);
        let sessions = Arc::clone(&self.sessions);
        let token = self.shutdown.child_token();

        self.tasks.spawn(async move {
            let accepted = tokio::select! {
                _ = token.cancelled() => None,
                accepted = Session::accept(stream) => Some(accepted),
            };
            match accepted {
                Some(Ok(session)) => serve_connection(session, &dispatcher, token).await,
                Some(Err(e)) => warn!("WebSocket handshake with {} failed: {}", peer, e),
                None => debug!("Server stopped during handshake with {}", peer),
            }
            remove_session(&sessions, id).await;
        });
    }

    /// Stop accepting and close every live connection
    ///
    /// Waits until each connection has sent its close frame.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        {
            let mut sessions = self.sessions.lock().await;
            if !sessions.is_empty() {
                info!("Closing {} client connection(s)", sessions.len());
            }
            sessions.clear();
        }

        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Number of connections currently registered
    pub async fn connection_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Drop a connection from the registry; a no-op if it is already gone
async fn remove_session(sessions: &SessionRegistry, id: Uuid) {
    if sessions.lock().await.remove(&id).is_some() {
        info!("Client {} disconnected", id);
    }
}

/// Read requests from one client until it closes or the server stops
async fn serve_connection<S>(mut session: Session<S>, dispatcher: &Dispatcher, token: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => {
                session.close().await;
                break;
            }
            message = session.recv() => message,
        };

        match message {
            Ok(Some(text)) => {
                debug!("Received request: {}", text);
                let Some(response) = dispatcher.handle_request(&text).await else {
                    continue;
                };

                let encoded = match serde_json::to_string(&response) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        error!("Failed to encode response: {}", e);
                        continue;
                    }
                };
                if let Err(e) = session.send_text(&encoded).await {
                    warn!("Failed to send response: {}", e);
                    break;
                }
                debug!("Sent response: {}", encoded);
            }
            Ok(None) => {
                debug!("Client closed the connection");
                break;
            }
            Err(e) => {
                warn!("Connection error: {}", e);
                break;
            }
        }
    }
}
