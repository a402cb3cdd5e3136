/// Public library interface for the vault MCP server
///
/// This module exports the WebSocket transport, the JSON-RPC dispatcher,
/// the tool registry and the stdio bridge so they can be used by the
/// binary, by other applications, or by tests.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

pub mod bridge;
pub mod config;
pub mod mcp;
pub mod shutdown;
pub mod storage;
pub mod tools;
pub mod ws;

// Re-export public modules and types
pub use bridge::{BridgeConfig, BridgeError};
pub use config::{ConfigError, Settings};
pub use mcp::{Dispatcher, JsonRpcResponse, McpServer};
pub use storage::{FsVault, NoteStore, StorageError};
pub use tools::{Permissions, ToolError, ToolRegistry};
pub use ws::{Session, WsError};

/// Errors that can occur during server operation
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("WebSocket error: {0}")]
    Transport(#[from] WsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Vault server that implements the MCP protocol over WebSocket
///
/// Owns the settings and the note store; builds the dispatcher and runs
/// the accept loop.
pub struct VaultMcpServer {
    settings: Settings,
    vault: Arc<FsVault>,
}

impl VaultMcpServer {
    /// Create a server for the vault at `vault_root`
    pub fn new(settings: Settings, vault_root: PathBuf) -> Result<Self, ServerError> {
        tracing::info!("Initializing vault MCP server for: {:?}", vault_root);
        settings.validate()?;

        let vault = FsVault::new(vault_root)?;
        Ok(Self {
            settings,
            vault: Arc::new(vault),
        })
    }

    /// Build a dispatcher over this server's vault and permissions
    pub fn dispatcher(&self) -> Dispatcher {
        let registry = ToolRegistry::new(self.vault.clone(), Permissions::from(&self.settings));
        Dispatcher::new(registry, self.settings.max_concurrent_requests)
    }

    /// Bind the configured address and serve until a shutdown signal
    pub async fn run(self) -> Result<(), ServerError> {
        let address = (self.settings.bind_address.as_str(), self.settings.server_port);
        let listener = TcpListener::bind(address).await?;

        let server = McpServer::new(self.dispatcher());
        let stopper = server.clone();
        tokio::spawn(async move {
            shutdown::shutdown_signal().await;
            stopper.stop().await;
        });

        server.serve(listener).await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a reference to the note store (useful for testing)
    pub fn vault(&self) -> &FsVault {
        &self.vault
    }
}
