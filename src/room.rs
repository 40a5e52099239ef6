//! Per-room state: sequence allocation, the ordered event log, and the
//! coordinator that serializes every mutation.
//!
//! ```text
//! submit(event)
//!      │
//!      ▼  (room mutex — single writer)
//! ┌──────────────────────────────────────┐
//! │ capacity check → resolve → next seq  │
//! │      → stamp → append → fan-out      │
//! └──────────────────────────────────────┘
//! ```
//!
//! All steps for one room run inside one critical section, which is what
//! makes sequence numbers match append order and broadcast order. Rooms are
//! independent; submissions to different rooms proceed in parallel.

use std::collections::HashMap;
use tokio::sync::Mutex;

use thiserror::Error;

use crate::broadcast::Fanout;
use crate::protocol::{Event, ServerMessage};
use crate::resolve::resolve;

/// Monotonic per-room sequence counters, starting at 1.
///
/// No internal lock: the allocator is only ever touched by its owning
/// coordinator, inside the room's critical section.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    counters: HashMap<String, u64>,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the post-increment value.
    pub fn next(&mut self, room_id: &str) -> u64 {
        let counter = self.counters.entry(room_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Read without mutating.
    pub fn current(&self, room_id: &str) -> u64 {
        self.counters.get(room_id).copied().unwrap_or(0)
    }

    pub fn reset(&mut self, room_id: &str) {
        self.counters.remove(room_id);
    }
}

/// Why a submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Dropped by the conflict resolver. The display string is the exact
    /// wire error sent to the submitter.
    #[error("Event rejected due to conflict resolution")]
    Conflict,
    /// The room's log reached its cap; nothing was stored or broadcast.
    #[error("Room event log is full")]
    Saturated,
    /// JOIN_ROOM / LEAVE_ROOM are membership operations, not log entries.
    #[error("Control events are not stored")]
    ControlEvent,
}

/// Ordered, append-only, in-memory log of accepted events for one room.
#[derive(Debug)]
pub struct EventLog {
    events: Vec<Event>,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            max_events,
        }
    }

    /// Append the next event. The caller (the coordinator) guarantees the
    /// event carries sequence = last + 1.
    pub fn append(&mut self, event: Event) -> Result<(), SubmitError> {
        if self.events.len() >= self.max_events {
            return Err(SubmitError::Saturated);
        }
        debug_assert_eq!(event.sequence, Some(self.last_sequence() + 1));
        self.events.push(event);
        Ok(())
    }

    /// The full ordered sequence, copied out.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.clone()
    }

    /// Events with sequence strictly greater than `seq`, in order.
    /// `since(0)` equals `snapshot()`.
    pub fn since(&self, seq: u64) -> Vec<Event> {
        let start = self.events.partition_point(|e| e.sequence.unwrap_or(0) <= seq);
        self.events[start..].to_vec()
    }

    /// Drop all events. Administrative reset only; a `CLEAR_CANVAS` event
    /// is appended like any other and never truncates the log.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.max_events
    }

    pub fn last_sequence(&self) -> u64 {
        self.events.last().and_then(|e| e.sequence).unwrap_or(0)
    }
}

struct RoomState {
    allocator: SequenceAllocator,
    log: EventLog,
}

/// Single-writer owner of one room's allocator and log.
///
/// All submissions to a room pass through one `tokio::sync::Mutex`, so no
/// two submits overlap and assigned sequences are dense in append order.
/// There is no network I/O inside the critical section; broadcasting pushes
/// into per-session bounded queues and never blocks.
pub struct RoomCoordinator {
    room_id: String,
    clear_cooldown_ms: i64,
    inner: Mutex<RoomState>,
}

impl RoomCoordinator {
    pub fn new(room_id: impl Into<String>, max_events: usize, clear_cooldown_ms: i64) -> Self {
        Self {
            room_id: room_id.into(),
            clear_cooldown_ms,
            inner: Mutex::new(RoomState {
                allocator: SequenceAllocator::new(),
                log: EventLog::new(max_events),
            }),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Run the full acceptance pipeline for one event and return the stored
    /// copy with its assigned sequence number.
    pub async fn submit(&self, event: Event) -> Result<Event, SubmitError> {
        let mut state = self.inner.lock().await;
        Self::run_pipeline(&mut state, &self.room_id, self.clear_cooldown_ms, event)
    }

    /// [`submit`](Self::submit), then broadcast the stored event to the
    /// room's current members while still holding the room lock, so that
    /// fan-out order equals sequence order equals append order.
    pub async fn submit_and_publish(
        &self,
        event: Event,
        fanout: &Fanout,
    ) -> Result<Event, SubmitError> {
        let mut state = self.inner.lock().await;
        let stored = Self::run_pipeline(&mut state, &self.room_id, self.clear_cooldown_ms, event)?;
        if let Err(e) = fanout
            .publish(&self.room_id, &ServerMessage::event(stored.clone()))
            .await
        {
            log::error!("broadcast failed for room {}: {e}", self.room_id);
        }
        Ok(stored)
    }

    fn run_pipeline(
        state: &mut RoomState,
        room_id: &str,
        clear_cooldown_ms: i64,
        event: Event,
    ) -> Result<Event, SubmitError> {
        if event.body.is_control() {
            return Err(SubmitError::ControlEvent);
        }
        // Refuse before allocating so a saturated log never leaves a gap
        // in the sequence.
        if state.log.is_full() {
            return Err(SubmitError::Saturated);
        }
        if !resolve(state.log.events(), &event, clear_cooldown_ms) {
            log::debug!(
                "room {room_id}: dropped {} from {} (conflict)",
                event.body.kind(),
                event.user_id
            );
            return Err(SubmitError::Conflict);
        }

        let seq = state.allocator.next(room_id);
        let mut stored = event;
        stored.sequence = Some(seq);
        state.log.append(stored.clone())?;
        log::trace!("room {room_id}: accepted {} as #{seq}", stored.body.kind());
        Ok(stored)
    }

    /// Full snapshot for ROOM_JOINED.
    pub async fn state(&self) -> Vec<Event> {
        self.inner.lock().await.log.snapshot()
    }

    /// Incremental catch-up: events with sequence strictly greater than `seq`.
    pub async fn state_since(&self, seq: u64) -> Vec<Event> {
        self.inner.lock().await.log.since(seq)
    }

    pub async fn event_count(&self) -> usize {
        self.inner.lock().await.log.len()
    }

    pub async fn last_sequence(&self) -> u64 {
        self.inner.lock().await.log.last_sequence()
    }

    /// Administrative reset: drop the log and restart sequencing at 1.
    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        state.log.clear();
        state.allocator.reset(&self.room_id);
        log::info!("room {} reset", self.room_id);
    }
}
