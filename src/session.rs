//! Per-socket session handle.
//!
//! A [`Session`] is the server's view of one connected client: a fresh
//! session id and the sending half of a bounded outbound queue. One writer
//! task per socket drains the queue, so everything a client receives
//! (CONNECTED, ROOM_JOINED, ERROR replies, and fanned-out EVENTs from
//! other tasks) is serialized through a single writer.
//!
//! Queueing uses `try_send` and never blocks: a slow reader loses messages
//! instead of stalling submitters, and a send after the socket closed is a
//! silent no-op.

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{ProtocolError, ServerMessage};

/// Outcome of queueing one message onto a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted onto the outbound queue.
    Queued,
    /// Queue full; the message was dropped.
    Dropped,
    /// The socket is gone; silent no-op.
    Closed,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    outbound: mpsc::Sender<Arc<str>>,
}

impl Session {
    /// Create a session with a freshly generated id and an outbound queue
    /// of the given capacity. The receiver belongs to the socket's writer
    /// task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (outbound, rx) = mpsc::channel(capacity);
        (
            Self {
                id: Uuid::new_v4(),
                outbound,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an already-encoded frame.
    pub fn deliver(&self, frame: Arc<str>) -> Delivery {
        match self.outbound.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("session {}: outbound queue full, dropping frame", self.id);
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Encode and queue a server message.
    pub fn send(&self, message: &ServerMessage) -> Result<Delivery, ProtocolError> {
        let frame: Arc<str> = message.encode()?.into();
        Ok(self.deliver(frame))
    }
}
