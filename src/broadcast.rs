//! Fan-out of accepted events to every session in a room.
//!
//! Messages are encoded once, then pushed onto each member's bounded
//! outbound queue from a membership snapshot. The sender is included on
//! purpose: echoing the stored event back is how a client learns the
//! sequence number the server assigned and reconciles its optimistic local
//! copy. Stats are atomics so publishing never takes a lock of its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::membership::MembershipTable;
use crate::protocol::{ProtocolError, ServerMessage};
use crate::session::Delivery;

/// Snapshot of fan-out health counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

#[derive(Default)]
struct AtomicFanoutStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

pub struct Fanout {
    membership: Arc<MembershipTable>,
    stats: AtomicFanoutStats,
}

impl Fanout {
    pub fn new(membership: Arc<MembershipTable>) -> Self {
        Self {
            membership,
            stats: AtomicFanoutStats::default(),
        }
    }

    /// Publish to every current member of the room, the originator included.
    /// Returns the number of sessions the message was queued for.
    pub async fn publish(
        &self,
        room_id: &str,
        message: &ServerMessage,
    ) -> Result<usize, ProtocolError> {
        self.publish_inner(room_id, None, message).await
    }

    /// Publish to every member except `exclude`. The server's event path
    /// does not use this (the sender must see its own sequence number),
    /// but notification-style messages can.
    pub async fn publish_except(
        &self,
        room_id: &str,
        exclude: Uuid,
        message: &ServerMessage,
    ) -> Result<usize, ProtocolError> {
        self.publish_inner(room_id, Some(exclude), message).await
    }

    async fn publish_inner(
        &self,
        room_id: &str,
        exclude: Option<Uuid>,
        message: &ServerMessage,
    ) -> Result<usize, ProtocolError> {
        let frame: Arc<str> = message.encode()?.into();
        let members = self.membership.members_of(room_id).await;

        let mut queued = 0;
        for session in members {
            if exclude == Some(session.id()) {
                continue;
            }
            match session.deliver(frame.clone()) {
                Delivery::Queued => {
                    queued += 1;
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                }
                Delivery::Dropped => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Delivery::Closed => {}
            }
        }
        Ok(queued)
    }

    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            messages_sent: self.stats.sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    async fn room_with_members(count: usize) -> (Arc<MembershipTable>, Vec<(Session, tokio::sync::mpsc::Receiver<Arc<str>>)>) {
        let membership = Arc::new(MembershipTable::new());
        let mut members = Vec::new();
        for _ in 0..count {
            let (session, rx) = Session::new(16);
            membership.join("r1", session.clone()).await;
            members.push((session, rx));
        }
        (membership, members)
    }

    #[tokio::test]
    async fn test_publish_reaches_all_members() {
        let (membership, mut members) = room_with_members(3).await;
        let fanout = Fanout::new(membership);

        let queued = fanout
            .publish("r1", &ServerMessage::error("x"))
            .await
            .unwrap();
        assert_eq!(queued, 3);

        for (_, rx) in members.iter_mut() {
            let frame = rx.recv().await.unwrap();
            assert_eq!(
                ServerMessage::decode(&frame).unwrap(),
                ServerMessage::error("x")
            );
        }
        assert_eq!(fanout.stats().messages_sent, 3);
    }

    #[tokio::test]
    async fn test_publish_except_skips_one() {
        let (membership, mut members) = room_with_members(2).await;
        let fanout = Fanout::new(membership);

        let excluded = members[0].0.id();
        let queued = fanout
            .publish_except("r1", excluded, &ServerMessage::error("x"))
            .await
            .unwrap();
        assert_eq!(queued, 1);
        assert!(members[0].1.try_recv().is_err());
        assert!(members[1].1.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_publish_to_empty_room() {
        let membership = Arc::new(MembershipTable::new());
        let fanout = Fanout::new(membership);
        let queued = fanout
            .publish("nobody", &ServerMessage::error("x"))
            .await
            .unwrap();
        assert_eq!(queued, 0);
    }

    #[tokio::test]
    async fn test_closed_member_does_not_count() {
        let (membership, members) = room_with_members(2).await;
        let fanout = Fanout::new(membership);

        // Simulate a dead socket: drop one receiver
        let (alive, mut alive_rx) = {
            let mut iter = members.into_iter();
            let (_dead, dead_rx) = iter.next().unwrap();
            drop(dead_rx);
            iter.next().unwrap()
        };

        let queued = fanout
            .publish("r1", &ServerMessage::error("x"))
            .await
            .unwrap();
        assert_eq!(queued, 1);
        assert!(alive_rx.try_recv().is_ok());
        let _ = alive;
    }

    #[tokio::test]
    async fn test_full_queue_counted_as_dropped() {
        let membership = Arc::new(MembershipTable::new());
        let (session, _rx) = Session::new(1);
        membership.join("r1", session).await;
        let fanout = Fanout::new(membership);

        fanout.publish("r1", &ServerMessage::error("a")).await.unwrap();
        let queued = fanout.publish("r1", &ServerMessage::error("b")).await.unwrap();
        assert_eq!(queued, 0);

        let stats = fanout.stats();
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_dropped, 1);
    }
}
