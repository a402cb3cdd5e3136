/// WebSocket frame encoding and decoding
///
/// This module implements the RFC 6455 base framing layer as a
/// `tokio_util` codec. Only single, unfragmented frames are ever written;
/// incoming frames are decoded one at a time from a growing receive buffer.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::ws::WsError;

/// Largest payload we are willing to buffer for a single frame
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Which end of the connection this codec speaks for
///
/// Clients must mask every frame they send; servers must never mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Frame opcodes defined by the base protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    /// Wire value of this opcode
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    /// Parse an opcode from the low nibble of the first header byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }
}

/// A single WebSocket frame
///
/// `masked` records whether the frame arrived masked; the payload held here
/// is always the unmasked application data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A final text frame carrying `payload`
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            masked: false,
            payload: payload.into(),
        }
    }

    /// An empty close frame
    pub fn close() -> Self {
        Self {
            fin: true,
            opcode: Opcode::Close,
            masked: false,
            payload: Vec::new(),
        }
    }
}

/// Codec for WebSocket frames
///
/// The encoder masks according to `role`. The decoder accepts masked and
/// unmasked frames alike and hands back unmasked payloads.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    role: Role,
    max_payload: usize,
}

impl FrameCodec {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_max_payload(role: Role, max_payload: usize) -> Self {
        Self { role, max_payload }
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Apply (or remove) a masking key in place
fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WsError> {
        if src.len() < 2 {
            return Ok(None);
        }

        let first = src[0];
        let second = src[1];

        if first & 0x70 != 0 {
            return Err(WsError::Protocol(
                "reserved bits set but no extensions were negotiated".to_string(),
            ));
        }

        let opcode = Opcode::from_u8(first & 0x0F).ok_or_else(|| {
            WsError::Protocol(format!("unknown opcode 0x{:x}", first & 0x0F))
        })?;
        let fin = first & 0x80 != 0;
        let masked = second & 0x80 != 0;

        // Header length grows with the extended length field and the mask key
        let mut header_len = 2usize;
        let payload_len = match second & 0x7F {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                header_len += 2;
                u16::from_be_bytes([src[2], src[3]]) as u64
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                header_len += 8;
                let mut ext = [0u8; 8];
                ext.copy_from_slice(&src[2..10]);
                let len = u64::from_be_bytes(ext);
                if len & (1 << 63) != 0 {
                    return Err(WsError::Protocol(
                        "64-bit payload length has its most significant bit set".to_string(),
                    ));
                }
                len
            }
            short => short as u64,
        };

        if payload_len > self.max_payload as u64 {
            return Err(WsError::Protocol(format!(
                "frame payload of {} bytes exceeds limit of {} bytes",
                payload_len, self.max_payload
            )));
        }
        let payload_len = payload_len as usize;

        let mask_key = if masked {
            if src.len() < header_len + 4 {
                return Ok(None);
            }
            let key = [
                src[header_len],
                src[header_len + 1],
                src[header_len + 2],
                src[header_len + 3],
            ];
            header_len += 4;
            Some(key)
        } else {
            None
        };

        if src.len() < header_len + payload_len {
            src.reserve(header_len + payload_len - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(payload_len).to_vec();
        if let Some(key) = mask_key {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Frame {
            fin,
            opcode,
            masked,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WsError> {
        let len = frame.payload.len();
        let mask = self.role == Role::Client;

        dst.reserve(14 + len);
        let fin_bit = if frame.fin { 0x80 } else { 0x00 };
        dst.put_u8(fin_bit | frame.opcode.as_u8());

        let mask_bit = if mask { 0x80 } else { 0x00 };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if len < 65536 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        if mask {
            let key: [u8; 4] = rand::random();
            dst.put_slice(&key);
            let start = dst.len();
            dst.put_slice(&frame.payload);
            apply_mask(&mut dst[start..], key);
        } else {
            dst.put_slice(&frame.payload);
        }

        Ok(())
    }
}

/// Encode `payload` as a single final text frame
///
/// Frames written by a client are masked with a fresh random key.
pub fn encode_text(payload: &[u8], from_client: bool) -> BytesMut {
    let role = if from_client { Role::Client } else { Role::Server };
    let mut dst = BytesMut::new();
    // Encoding into a BytesMut cannot fail
    let _ = FrameCodec::new(role).encode(Frame::text(payload.to_vec()), &mut dst);
    dst
}
