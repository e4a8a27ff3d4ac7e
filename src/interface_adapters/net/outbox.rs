// FIFO of client messages waiting for an open socket.

use crate::interface_adapters::net::transport::TransportError;
use crate::interface_adapters::protocol::{ClientMessage, encode_client_message};
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Anything that can carry one text frame to the server.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<ClientMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message; a newer input replaces any input still waiting for the same player.
    pub fn push(&mut self, message: ClientMessage) {
        if let ClientMessage::PlayerInput(input) = &message {
            let before = self.queue.len();
            self.queue.retain(|queued| {
                !matches!(queued, ClientMessage::PlayerInput(q) if q.player_id == input.player_id)
            });
            if self.queue.len() < before {
                debug!(player_id = %input.player_id, "stale queued input replaced");
            }
        }
        self.queue.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Sends queued messages in order; a failed message goes back to the front with the rest.
    pub async fn flush<S>(&mut self, sink: &mut S) -> Result<usize, TransportError>
    where
        S: FrameSink + ?Sized,
    {
        let mut sent = 0;
        while let Some(message) = self.queue.pop_front() {
            let text = match encode_client_message(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to serialize queued message; dropping");
                    continue;
                }
            };

            if let Err(err) = sink.send_text(text).await {
                self.queue.push_front(message);
                debug!(remaining = self.queue.len(), "flush interrupted; message requeued");
                return Err(err);
            }
            sent += 1;
        }
        Ok(sent)
    }
}
