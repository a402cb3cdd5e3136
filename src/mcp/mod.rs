/// MCP protocol implementation
///
/// This module handles the Model Context Protocol communication,
/// including JSON-RPC parsing, method dispatch and the WebSocket server.

pub mod dispatch;
pub mod protocol;
pub mod server;

// Re-export main types
pub use dispatch::{DispatchError, Dispatcher};
pub use protocol::{JsonRpcRequest, JsonRpcResponse};
pub use server::McpServer;
