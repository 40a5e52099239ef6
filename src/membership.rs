//! Membership table: which sessions are in which room.
//!
//! Two coupled maps behind one mutex, with the invariant that a session
//! appears in a room's set iff that room is the session's current room.
//! A session is in at most one room at a time; joining a second room leaves
//! the first. Snapshots are copied out so the fan-out iterates without
//! holding the table lock.

use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::session::Session;

#[derive(Default)]
struct Tables {
    rooms: HashMap<String, HashMap<Uuid, Session>>,
    session_rooms: HashMap<Uuid, String>,
}

impl Tables {
    fn remove_member(&mut self, room_id: &str, session_id: Uuid) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(&session_id);
            if members.is_empty() {
                // Drop the key; the coordinator in the registry is unaffected.
                self.rooms.remove(room_id);
            }
        }
    }
}

#[derive(Default)]
pub struct MembershipTable {
    inner: Mutex<Tables>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put the session in `room_id`, leaving its previous room first if it
    /// had one.
    pub async fn join(&self, room_id: &str, session: Session) {
        let mut tables = self.inner.lock().await;
        let session_id = session.id();
        if let Some(previous) = tables.session_rooms.remove(&session_id) {
            tables.remove_member(&previous, session_id);
        }
        tables
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(session_id, session);
        tables.session_rooms.insert(session_id, room_id.to_string());
    }

    /// Remove the session from `room_id`.
    pub async fn leave(&self, room_id: &str, session_id: Uuid) {
        let mut tables = self.inner.lock().await;
        tables.remove_member(room_id, session_id);
        if tables.session_rooms.get(&session_id).map(String::as_str) == Some(room_id) {
            tables.session_rooms.remove(&session_id);
        }
    }

    /// Remove the session from whichever room it is in, returning that room.
    pub async fn disconnect(&self, session_id: Uuid) -> Option<String> {
        let mut tables = self.inner.lock().await;
        let room_id = tables.session_rooms.remove(&session_id)?;
        tables.remove_member(&room_id, session_id);
        Some(room_id)
    }

    /// Snapshot of the sessions currently in `room_id`.
    pub async fn members_of(&self, room_id: &str) -> Vec<Session> {
        self.inner
            .lock()
            .await
            .rooms
            .get(room_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn room_of(&self, session_id: Uuid) -> Option<String> {
        self.inner
            .lock()
            .await
            .session_rooms
            .get(&session_id)
            .cloned()
    }

    pub async fn user_count(&self, room_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .rooms
            .get(room_id)
            .map_or(0, HashMap::len)
    }
}
