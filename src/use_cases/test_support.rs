use std::sync::{Arc, Mutex};

use crate::domain::{
    AvatarHandle, Clock, Direction, MessageOutbox, OutboundMessage, Position, TransportControl,
};

// Outbox fake that records every message in send order.
#[derive(Clone, Default)]
pub(crate) struct RecordingOutbox {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RecordingOutbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("outbox mutex poisoned").clone()
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().expect("outbox mutex poisoned").clear();
    }
}

impl MessageOutbox for RecordingOutbox {
    fn send(&self, message: OutboundMessage) {
        self.sent
            .lock()
            .expect("outbox mutex poisoned")
            .push(message);
    }
}

type AvatarFrame = (Position, Direction, String);

// Render handle fake that keeps the last frame it was asked to show.
#[derive(Clone, Default)]
pub(crate) struct RecordingAvatar {
    frames: Arc<Mutex<Vec<AvatarFrame>>>,
}

impl RecordingAvatar {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn last(&self) -> Option<AvatarFrame> {
        self.frames
            .lock()
            .expect("avatar mutex poisoned")
            .last()
            .cloned()
    }
}

impl AvatarHandle for RecordingAvatar {
    fn sync(&mut self, position: Position, direction: Direction, animation: &str) {
        self.frames
            .lock()
            .expect("avatar mutex poisoned")
            .push((position, direction, animation.to_string()));
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingControl {
    disconnects: Arc<Mutex<usize>>,
}

impl RecordingControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn disconnects(&self) -> usize {
        *self.disconnects.lock().expect("control mutex poisoned")
    }
}

impl TransportControl for RecordingControl {
    fn disconnect(&self) {
        *self.disconnects.lock().expect("control mutex poisoned") += 1;
    }
}

pub(crate) struct FixedClock {
    pub(crate) now: u64,
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.now
    }
}
