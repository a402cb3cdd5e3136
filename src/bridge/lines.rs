/// Newline-delimited JSON input splitting
///
/// Input arrives in arbitrary chunks. Bytes are buffered until a newline
/// completes a line, so a UTF-8 sequence or a JSON document split across
/// chunks is reassembled before it is inspected.

use bytes::BytesMut;
use serde::de::IgnoredAny;
use tracing::warn;

#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
    /// Bytes of `pending` already known to hold no newline
    next_index: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every complete line that holds valid JSON
    ///
    /// Blank lines are skipped; invalid lines are logged and dropped. The
    /// trailing incomplete segment stays buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        loop {
            let offset = self.next_index;
            let Some(found) = self.pending[offset..].iter().position(|b| *b == b'\n') else {
                self.next_index = self.pending.len();
                break;
            };

            let newline = offset + found;
            self.next_index = 0;
            let raw = self.pending.split_to(newline + 1);
            if let Some(line) = accept_line(&raw[..newline]) {
                lines.push(line);
            }
        }
        lines
    }

    /// Bytes held back waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn accept_line(raw: &[u8]) -> Option<String> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(e) => {
            warn!("Dropping input line that is not valid UTF-8: {}", e);
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<IgnoredAny>(text) {
        Ok(_) => Some(text.to_string()),
        Err(e) => {
            warn!("Invalid JSON from stdin: {}", e);
            None
        }
    }
}
