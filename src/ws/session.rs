/// A single WebSocket connection
///
/// The session owns the stream and its receive buffer. Every read appends
/// to the buffer and the frame codec consumes whole frames from its front,
/// so bytes are delivered in exactly the order the peer wrote them.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::ws::frame::{Frame, FrameCodec, Opcode, Role};
use crate::ws::handshake::{self, ClientHandshake};
use crate::ws::queue::MessageSink;
use crate::ws::WsError;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Stream is connected but the upgrade has not completed
    Connecting,
    /// Handshake complete; text messages may flow both ways
    Open,
    /// Closed by either side
    Closed,
    /// A transport or protocol error ended the connection
    Failed,
}

pub struct Session<S> {
    stream: S,
    buffer: BytesMut,
    codec: FrameCodec,
    state: SessionState,
}

impl Session<TcpStream> {
    /// Open a TCP connection to `host:port` and upgrade it
    pub async fn connect(host: &str, port: u16, path: &str) -> Result<Self, WsError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        let mut session = Session::new(stream, Role::Client);
        session.client_handshake(&format!("{}:{}", host, port), path).await?;
        debug!("WebSocket connection to {}:{}{} is open", host, port, path);
        Ok(session)
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream; the handshake has not happened yet
    pub fn new(stream: S, role: Role) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(8 * 1024),
            codec: FrameCodec::new(role),
            state: SessionState::Connecting,
        }
    }

    /// Accept an incoming connection and answer its upgrade request
    pub async fn accept(stream: S) -> Result<Self, WsError> {
        let mut session = Session::new(stream, Role::Server);
        let result = session.server_handshake().await;
        session.settle(result)?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.codec.role()
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Send the upgrade request and wait for a successful 101 response
    pub async fn client_handshake(&mut self, host: &str, path: &str) -> Result<(), WsError> {
        let handshake = ClientHandshake::new(host, path);
        let result = self.run_client_handshake(&handshake).await;
        self.settle(result)
    }

    async fn run_client_handshake(&mut self, handshake: &ClientHandshake) -> Result<(), WsError> {
        if self.state != SessionState::Connecting {
            return Err(WsError::NotOpen(self.state));
        }

        self.stream.write_all(handshake.request().as_bytes()).await?;
        self.stream.flush().await?;

        loop {
            if let Some(header_len) = handshake.parse_response(&self.buffer)? {
                // Anything past the header block is already frame data
                self.buffer.advance(header_len);
                self.state = SessionState::Open;
                return Ok(());
            }
            self.fill_buffer().await?;
        }
    }

    async fn server_handshake(&mut self) -> Result<(), WsError> {
        loop {
            match handshake::parse_upgrade_request(&self.buffer) {
                Ok(Some(upgrade)) => {
                    self.stream.write_all(upgrade.response.as_bytes()).await?;
                    self.stream.flush().await?;
                    self.buffer.advance(upgrade.header_len);
                    self.state = SessionState::Open;
                    debug!("Accepted WebSocket upgrade for {}", upgrade.path);
                    return Ok(());
                }
                Ok(None) => self.fill_buffer().await?,
                Err(e) => {
                    let _ = self
                        .stream
                        .write_all(handshake::BAD_REQUEST_RESPONSE.as_bytes())
                        .await;
                    let _ = self.stream.shutdown().await;
                    return Err(e);
                }
            }
        }
    }

    /// Read more bytes from the stream into the receive buffer
    async fn fill_buffer(&mut self) -> Result<(), WsError> {
        let read = self.stream.read_buf(&mut self.buffer).await?;
        if read == 0 {
            return Err(WsError::ConnectionClosed);
        }
        Ok(())
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), WsError> {
        let mut out = BytesMut::new();
        self.codec.encode(frame, &mut out)?;
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send one text message as a single frame
    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        if self.state != SessionState::Open {
            return Err(WsError::NotOpen(self.state));
        }
        let result = self.write_frame(Frame::text(text.as_bytes())).await;
        self.settle(result)
    }

    /// Wait for the next complete text message
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. Binary,
    /// ping, pong and continuation frames are consumed and dropped. This
    /// method is cancel-safe: bytes already read stay in the buffer.
    pub async fn recv(&mut self) -> Result<Option<String>, WsError> {
        if self.state != SessionState::Open {
            return Err(WsError::NotOpen(self.state));
        }
        let result = self.next_message().await;
        self.settle(result)
    }

    async fn next_message(&mut self) -> Result<Option<String>, WsError> {
        loop {
            while let Some(frame) = self.codec.decode(&mut self.buffer)? {
                match frame.opcode {
                    Opcode::Text => match String::from_utf8(frame.payload) {
                        Ok(text) => return Ok(Some(text)),
                        Err(e) => warn!("Dropping text frame that is not valid UTF-8: {}", e),
                    },
                    Opcode::Close => {
                        debug!("Peer sent close frame");
                        // The close is consumed; a cancelled reply must not leave us Open
                        self.state = SessionState::Closed;
                        let _ = self.write_frame(Frame::close()).await;
                        return Ok(None);
                    }
                    other => {
                        debug!("Ignoring unsupported {:?} frame ({} bytes)", other, frame.payload.len());
                    }
                }
            }

            match self.fill_buffer().await {
                Ok(()) => {}
                Err(WsError::ConnectionClosed) => {
                    if !self.buffer.is_empty() {
                        warn!("Connection closed with {} undecoded bytes", self.buffer.len());
                    }
                    self.state = SessionState::Closed;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a close frame and shut down the write half
    ///
    /// Safe to call more than once; only an open session writes anything.
    pub async fn close(&mut self) {
        if self.state == SessionState::Open {
            if let Err(e) = self.write_frame(Frame::close()).await {
                debug!("Failed to send close frame: {}", e);
            }
        }
        if matches!(self.state, SessionState::Open | SessionState::Connecting) {
            let _ = self.stream.shutdown().await;
            self.state = SessionState::Closed;
        }
    }

    /// Mark the session failed when an operation errors
    fn settle<T>(&mut self, result: Result<T, WsError>) -> Result<T, WsError> {
        if result.is_err() && self.state != SessionState::Closed {
            self.state = SessionState::Failed;
        }
        result
    }
}

#[async_trait]
impl<S> MessageSink for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        Session::send_text(self, text).await
    }
}
