/// Minimal WebSocket implementation on top of raw TCP streams
///
/// This module covers exactly what the MCP transport needs: the upgrade
/// handshake, single-frame text messages, and close handling. There is no
/// TLS, no extension negotiation and no message fragmentation.

pub mod frame;
pub mod handshake;
pub mod queue;
pub mod session;

pub use frame::{encode_text, Frame, FrameCodec, Opcode, Role};
pub use handshake::{accept_key, ClientHandshake};
pub use queue::{MessageSink, OutboundQueue};
pub use session::{Session, SessionState};

use thiserror::Error;

/// Errors raised by the WebSocket transport
#[derive(Error, Debug)]
pub enum WsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Connection is not open (state: {0:?})")]
    NotOpen(SessionState),
}
