/// HTTP/1.1 upgrade handshake for WebSocket connections
///
/// Both directions are expressed as pure functions over byte buffers so
/// the session can feed them whatever has arrived on the socket so far.
/// A header block is complete at the first CRLF CRLF; anything after it
/// already belongs to the frame stream.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::ws::WsError;

/// GUID appended to the client key when computing the accept key
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on a handshake header block
pub const MAX_HEADER_BLOCK: usize = 8 * 1024;

const MAX_HEADERS: usize = 32;

/// Compute the `Sec-WebSocket-Accept` value for a client key
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Locate the end of the header block, returning the number of bytes it spans
/// including the terminating blank line
pub fn header_block_len(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn header_value<'a>(headers: &'a [httparse::Header<'a>], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .map(str::trim)
}

/// Client half of the handshake
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    host: String,
    path: String,
    key: String,
}

impl ClientHandshake {
    /// Start a handshake for `host` (including the port) and request `path`
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let nonce: [u8; 16] = rand::random();
        Self {
            host: host.into(),
            path: path.into(),
            key: STANDARD.encode(nonce),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The full upgrade request, terminated by an empty line
    pub fn request(&self) -> String {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            self.path, self.host, self.key
        )
    }

    /// Inspect the buffered response
    ///
    /// Returns `Ok(None)` while the header block is incomplete and
    /// `Ok(Some(len))` once a 101 response has been validated, where `len`
    /// is the number of header bytes to strip from the buffer.
    pub fn parse_response(&self, buf: &[u8]) -> Result<Option<usize>, WsError> {
        let Some(len) = header_block_len(buf) else {
            if buf.len() > MAX_HEADER_BLOCK {
                return Err(WsError::Handshake("response headers too large".to_string()));
            }
            return Ok(None);
        };

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(&buf[..len]) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(WsError::Handshake("incomplete response header block".to_string()));
            }
            Err(e) => return Err(WsError::Handshake(format!("malformed response: {}", e))),
        }

        let code = response.code.unwrap_or(0);
        if code != 101 {
            let reason = response.reason.unwrap_or("");
            return Err(WsError::Handshake(format!(
                "server answered {} {} instead of 101",
                code, reason
            )));
        }

        let expected = accept_key(&self.key);
        match header_value(response.headers, "Sec-WebSocket-Accept") {
            Some(accept) if accept == expected => Ok(Some(len)),
            Some(_) => Err(WsError::Handshake("Sec-WebSocket-Accept mismatch".to_string())),
            None => Err(WsError::Handshake("missing Sec-WebSocket-Accept".to_string())),
        }
    }
}

/// Outcome of inspecting a client's upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Bytes occupied by the request header block
    pub header_len: usize,
    pub path: String,
    /// Response to write back: a 101 on success
    pub response: String,
}

/// Server half of the handshake
///
/// Returns `Ok(None)` until the header block has fully arrived.
pub fn parse_upgrade_request(buf: &[u8]) -> Result<Option<UpgradeRequest>, WsError> {
    let Some(len) = header_block_len(buf) else {
        if buf.len() > MAX_HEADER_BLOCK {
            return Err(WsError::Handshake("request headers too large".to_string()));
        }
        return Ok(None);
    };

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(&buf[..len]) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(WsError::Handshake("incomplete request header block".to_string()));
        }
        Err(e) => return Err(WsError::Handshake(format!("malformed request: {}", e))),
    }

    if request.method != Some("GET") {
        return Err(WsError::Handshake(format!(
            "unexpected method {}",
            request.method.unwrap_or("")
        )));
    }

    let upgrade = header_value(request.headers, "Upgrade").unwrap_or("");
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(WsError::Handshake("missing Upgrade: websocket".to_string()));
    }

    let key = header_value(request.headers, "Sec-WebSocket-Key")
        .filter(|k| !k.is_empty())
        .ok_or_else(|| WsError::Handshake("missing Sec-WebSocket-Key".to_string()))?;

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    );

    Ok(Some(UpgradeRequest {
        header_len: len,
        path: request.path.unwrap_or("/").to_string(),
        response,
    }))
}

/// Response sent to a peer whose upgrade request was rejected
pub const BAD_REQUEST_RESPONSE: &str =
    "HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";
