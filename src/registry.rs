//! Room registry: maps room ids to their coordinators.
//!
//! Rooms are created lazily on first use and live until an administrative
//! delete or process exit; membership draining to zero does not evict a
//! room, so late joiners still see its history.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::room::RoomCoordinator;

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<RoomCoordinator>>>,
    max_events_per_room: usize,
    clear_cooldown_ms: i64,
}

impl RoomRegistry {
    pub fn new(max_events_per_room: usize, clear_cooldown_ms: i64) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_events_per_room,
            clear_cooldown_ms,
        }
    }

    /// Get the coordinator for `room_id`, atomically installing a fresh one
    /// if the room does not exist yet.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<RoomCoordinator> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        // Slow path: write lock to create
        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(RoomCoordinator::new(
            room_id,
            self.max_events_per_room,
            self.clear_cooldown_ms,
        ));
        rooms.insert(room_id.to_string(), room.clone());
        log::info!("room {room_id} created");
        room
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<RoomCoordinator>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Remove the room, returning its coordinator so the caller can reset it.
    pub async fn remove(&self, room_id: &str) -> Option<Arc<RoomCoordinator>> {
        self.rooms.write().await.remove(room_id)
    }

    /// Snapshot of active room ids.
    pub async fn list(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
