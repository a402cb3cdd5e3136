/// Outbound message queue for a connection that may not be ready yet
///
/// Messages produced before the handshake completes are held in insertion
/// order and written exactly once when the connection opens.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::debug;

use crate::ws::WsError;

/// Anything that can carry whole text messages to the peer
#[async_trait]
pub trait MessageSink {
    async fn send_text(&mut self, text: &str) -> Result<(), WsError>;
}

/// FIFO of messages waiting for the connection to open
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<String>,
    ready: bool,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the queue has been flushed into an open connection
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Send `message` now if the connection is open, otherwise hold it
    pub async fn enqueue<S>(&mut self, message: String, sink: Option<&mut S>) -> Result<(), WsError>
    where
        S: MessageSink + Send + ?Sized,
    {
        match sink {
            Some(sink) if self.ready => sink.send_text(&message).await,
            _ => {
                debug!("Connection not ready, queuing message ({} pending)", self.pending.len() + 1);
                self.pending.push_back(message);
                Ok(())
            }
        }
    }

    /// Drain every held message into `sink`, oldest first
    ///
    /// Called once, when the connection opens. On a send failure the
    /// unsent message stays at the head of the queue.
    pub async fn flush<S>(&mut self, sink: &mut S) -> Result<usize, WsError>
    where
        S: MessageSink + Send + ?Sized,
    {
        let mut sent = 0;
        while let Some(message) = self.pending.front() {
            debug!("Sending queued message: {}", message);
            sink.send_text(message).await?;
            self.pending.pop_front();
            sent += 1;
        }
        self.ready = true;
        Ok(sent)
    }
}
