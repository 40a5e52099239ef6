//! Administrative HTTP surface.
//!
//! Thin adapters over the core's public operations. The router is handed
//! the same registry and fan-out as the WebSocket hub, so an event posted
//! here lands in the same room state socket clients see and is broadcast
//! to them. There is exactly one core per process.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::broadcast::Fanout;
use crate::protocol::{now_ms, Event, ServerMessage};
use crate::registry::RoomRegistry;
use crate::validate::{validate_event, Limits};

/// Shared state for the admin routes.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<RoomRegistry>,
    pub fanout: Arc<Fanout>,
    pub limits: Limits,
}

impl AdminState {
    pub fn new(registry: Arc<RoomRegistry>, fanout: Arc<Fanout>, limits: Limits) -> Self {
        Self {
            registry,
            fanout,
            limits,
        }
    }
}

/// Build the admin router.
pub fn routes(state: AdminState) -> Router {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/:room_id/state", get(room_state))
        .route("/rooms/:room_id", delete(delete_room))
        .route("/events/:room_id", get(room_events))
        .route("/events", post(submit_event))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub rooms: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomStateResponse {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub events: Vec<Event>,
    #[serde(rename = "eventCount")]
    pub event_count: usize,
    pub exists: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRoomResponse {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub deleted: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EventsQuery {
    pub after: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitEventRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub event: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /rooms — active room ids from the registry.
async fn list_rooms(State(state): State<AdminState>) -> Json<RoomListResponse> {
    let rooms = state.registry.list().await;
    let count = rooms.len();
    Json(RoomListResponse { rooms, count })
}

/// GET /rooms/:room_id/state — full snapshot, 404 for unknown rooms.
async fn room_state(
    State(state): State<AdminState>,
    Path(room_id): Path<String>,
) -> (StatusCode, Json<RoomStateResponse>) {
    match state.registry.get(&room_id).await {
        Some(coordinator) => {
            let events = coordinator.state().await;
            let event_count = events.len();
            (
                StatusCode::OK,
                Json(RoomStateResponse {
                    room_id,
                    events,
                    event_count,
                    exists: true,
                }),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(RoomStateResponse {
                room_id,
                events: Vec::new(),
                event_count: 0,
                exists: false,
            }),
        ),
    }
}

/// DELETE /rooms/:room_id — clear the room's log and sequence, drop it from
/// the registry.
async fn delete_room(
    State(state): State<AdminState>,
    Path(room_id): Path<String>,
) -> (StatusCode, Json<DeleteRoomResponse>) {
    match state.registry.remove(&room_id).await {
        Some(coordinator) => {
            coordinator.reset().await;
            log::info!("room {room_id} deleted via admin api");
            (
                StatusCode::OK,
                Json(DeleteRoomResponse {
                    room_id,
                    deleted: true,
                }),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(DeleteRoomResponse {
                room_id,
                deleted: false,
            }),
        ),
    }
}

/// GET /events/:room_id[?after=N] — snapshot or incremental catch-up.
async fn room_events(
    State(state): State<AdminState>,
    Path(room_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> (StatusCode, Json<RoomStateResponse>) {
    match state.registry.get(&room_id).await {
        Some(coordinator) => {
            let events = match query.after {
                Some(after) => coordinator.state_since(after).await,
                None => coordinator.state().await,
            };
            let event_count = events.len();
            (
                StatusCode::OK,
                Json(RoomStateResponse {
                    room_id,
                    events,
                    event_count,
                    exists: true,
                }),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(RoomStateResponse {
                room_id,
                events: Vec::new(),
                event_count: 0,
                exists: false,
            }),
        ),
    }
}

/// POST /events — identical pipeline to a wire-submitted event: stamp,
/// validate, submit, broadcast. Creates the room lazily.
async fn submit_event(
    State(state): State<AdminState>,
    Json(request): Json<SubmitEventRequest>,
) -> Result<Json<Event>, (StatusCode, Json<ErrorResponse>)> {
    let bad_request = |error: &str| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: error.to_string(),
            }),
        )
    };

    if request.room_id.is_empty() {
        return Err(bad_request("Invalid event"));
    }

    let mut frame = request.event;
    let Some(obj) = frame.as_object_mut() else {
        return Err(bad_request("Invalid event"));
    };
    obj.insert("roomId".to_string(), Value::String(request.room_id.clone()));
    obj.insert("timestamp".to_string(), Value::from(now_ms()));

    let event = match validate_event(&frame, &state.limits) {
        Ok(event) => event,
        Err(e) => {
            log::debug!("admin submit rejected: {e}");
            return Err(bad_request("Invalid event"));
        }
    };

    let coordinator = state.registry.get_or_create(&request.room_id).await;
    match coordinator.submit_and_publish(event, &state.fanout).await {
        Ok(stored) => Ok(Json(stored)),
        Err(e) => Err(bad_request(&e.to_string())),
    }
}
