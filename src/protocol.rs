//! JSON wire protocol between whiteboard clients and the server.
//!
//! Every frame is a single JSON object. Client frames carry the event
//! envelope with the `type` tag and header fields as siblings of the
//! payload fields:
//!
//! ```text
//! {"type": "DRAW_LINE", "userId": "u1", "roomId": "r1", "timestamp": 1712.. ,
//!  "points": [[0,0],[1,1]], "color": "#FF0000", "strokeWidth": 2.5}
//! ```
//!
//! Server frames are discriminated the same way: `CONNECTED`, `ROOM_JOINED`,
//! `EVENT`, `ERROR`. Accepted events are echoed to every room member,
//! including the originator, which is how a client learns the sequence
//! number the server assigned to its optimistic local copy.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// A single coordinate pair, serialized as a two-element JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point(pub f64, pub f64);

impl Point {
    pub fn is_finite(&self) -> bool {
        self.0.is_finite() && self.1.is_finite()
    }
}

/// Payload of a `DRAW_LINE` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    /// 6-digit hex color, `#RRGGBB`.
    pub color: String,
    #[serde(rename = "strokeWidth")]
    pub stroke_width: f64,
}

/// Payload of a `DRAW_PATH` event. Identical to [`Stroke`] except the wire
/// field is named `path`; the server treats both kinds the same way and the
/// distinction is purely a client rendering hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStroke {
    pub path: Vec<Point>,
    pub color: String,
    #[serde(rename = "strokeWidth")]
    pub stroke_width: f64,
}

/// Rectangular erase region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Event variants (closed set). The tag and payload fields serialize flat
/// into the event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventBody {
    #[serde(rename = "DRAW_LINE")]
    DrawLine(Stroke),
    #[serde(rename = "DRAW_PATH")]
    DrawPath(PathStroke),
    #[serde(rename = "ERASE")]
    Erase { region: Region },
    #[serde(rename = "CLEAR_CANVAS")]
    ClearCanvas,
    #[serde(rename = "JOIN_ROOM")]
    JoinRoom,
    #[serde(rename = "LEAVE_ROOM")]
    LeaveRoom,
}

impl EventBody {
    /// Control events manage membership; they are never stored in a room's
    /// event log and never reach the conflict resolver.
    pub fn is_control(&self) -> bool {
        matches!(self, EventBody::JoinRoom | EventBody::LeaveRoom)
    }

    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EventBody::DrawLine(_) => "DRAW_LINE",
            EventBody::DrawPath(_) => "DRAW_PATH",
            EventBody::Erase { .. } => "ERASE",
            EventBody::ClearCanvas => "CLEAR_CANVAS",
            EventBody::JoinRoom => "JOIN_ROOM",
            EventBody::LeaveRoom => "LEAVE_ROOM",
        }
    }
}

/// A whiteboard event: common header plus one of the [`EventBody`] variants.
///
/// `sequence` is assigned by the server at acceptance and is absent on
/// client-emitted events. `roomId` and `timestamp` are server-authoritative
/// on ingress; client-supplied values are overwritten before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub body: EventBody,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl Event {
    pub fn new(
        body: EventBody,
        user_id: impl Into<String>,
        room_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            body,
            user_id: user_id.into(),
            room_id: room_id.into(),
            timestamp,
            sequence: None,
        }
    }
}

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once when the socket opens.
    #[serde(rename = "CONNECTED")]
    Connected {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        message: String,
    },
    /// Sent to the joiner with the full room snapshot.
    #[serde(rename = "ROOM_JOINED")]
    RoomJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userCount")]
        user_count: usize,
        state: Vec<Event>,
        #[serde(rename = "stateEventCount")]
        state_event_count: usize,
    },
    /// One accepted, sequenced event, fanned out to every room member.
    #[serde(rename = "EVENT")]
    Event { event: Event },
    #[serde(rename = "ERROR")]
    Error { error: String },
}

impl ServerMessage {
    pub fn connected(session_id: Uuid) -> Self {
        Self::Connected {
            session_id,
            message: "Connected to whiteboard server".to_string(),
        }
    }

    pub fn room_joined(room_id: impl Into<String>, user_count: usize, state: Vec<Event>) -> Self {
        let state_event_count = state.len();
        Self::RoomJoined {
            room_id: room_id.into(),
            user_count,
            state,
            state_event_count,
        }
    }

    pub fn event(event: Event) -> Self {
        Self::Event { event }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialize(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialize(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialize(String),
    #[error("deserialization error: {0}")]
    Deserialize(String),
    #[error("connection closed")]
    ConnectionClosed,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
