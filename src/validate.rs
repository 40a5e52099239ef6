//! Structural and semantic validation of untrusted inbound events.
//!
//! A pure function from a decoded JSON frame to a typed [`Event`]. Frames
//! come straight off the wire, so the checks are field-by-field over a
//! [`serde_json::Value`] rather than a serde derive: a missing payload field
//! must reject the *event* without being confused with an unparseable
//! *frame*, which the error taxonomy reports differently.
//!
//! Callers overwrite `roomId` and `timestamp` with server-authoritative
//! values before validating; any client-supplied `sequence` is discarded.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::{Event, EventBody, PathStroke, Point, Region, Stroke};

/// Default cap on coordinate pairs in a single stroke.
pub const DEFAULT_MAX_POINTS: usize = 1_000;

/// Validation limits, taken from the server configuration.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_points_per_event: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_points_per_event: DEFAULT_MAX_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("unknown event type")]
    UnknownType,
    #[error("missing or invalid field: {0}")]
    Field(&'static str),
    #[error("stroke exceeds {0} points")]
    TooManyPoints(usize),
}

/// Validate a decoded frame and produce a typed event.
///
/// Accepts all six event kinds; control events (`JOIN_ROOM`, `LEAVE_ROOM`)
/// validate as header-only. The returned event never carries a sequence
/// number; only the room coordinator assigns those.
pub fn validate_event(frame: &Value, limits: &Limits) -> Result<Event, ValidateError> {
    let obj = frame.as_object().ok_or(ValidateError::NotAnObject)?;

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ValidateError::Field("type"))?;
    let user_id = non_empty_str(obj, "userId")?;
    let room_id = non_empty_str(obj, "roomId")?;
    let timestamp = obj
        .get("timestamp")
        .and_then(Value::as_f64)
        .filter(|t| t.is_finite())
        .ok_or(ValidateError::Field("timestamp"))? as i64;

    let body = match kind {
        "DRAW_LINE" => {
            let (points, color, stroke_width) = stroke_fields(obj, "points", limits)?;
            EventBody::DrawLine(Stroke {
                points,
                color,
                stroke_width,
            })
        }
        "DRAW_PATH" => {
            let (path, color, stroke_width) = stroke_fields(obj, "path", limits)?;
            EventBody::DrawPath(PathStroke {
                path,
                color,
                stroke_width,
            })
        }
        "ERASE" => EventBody::Erase {
            region: region_field(obj)?,
        },
        "CLEAR_CANVAS" => EventBody::ClearCanvas,
        "JOIN_ROOM" => EventBody::JoinRoom,
        "LEAVE_ROOM" => EventBody::LeaveRoom,
        _ => return Err(ValidateError::UnknownType),
    };

    Ok(Event {
        body,
        user_id,
        room_id,
        timestamp,
        sequence: None,
    })
}

/// Whether `s` is a 6-digit hex color of the form `#RRGGBB`.
pub fn is_hex_color(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}

fn non_empty_str(obj: &Map<String, Value>, key: &'static str) -> Result<String, ValidateError> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or(ValidateError::Field(key))
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

fn stroke_fields(
    obj: &Map<String, Value>,
    points_key: &'static str,
    limits: &Limits,
) -> Result<(Vec<Point>, String, f64), ValidateError> {
    let raw = obj
        .get(points_key)
        .and_then(Value::as_array)
        .ok_or(ValidateError::Field(points_key))?;
    if raw.len() < 2 {
        return Err(ValidateError::Field(points_key));
    }
    if raw.len() > limits.max_points_per_event {
        return Err(ValidateError::TooManyPoints(limits.max_points_per_event));
    }

    let mut points = Vec::with_capacity(raw.len());
    for pair in raw {
        let pair = pair.as_array().ok_or(ValidateError::Field(points_key))?;
        if pair.len() != 2 {
            return Err(ValidateError::Field(points_key));
        }
        let x = finite(&pair[0]).ok_or(ValidateError::Field(points_key))?;
        let y = finite(&pair[1]).ok_or(ValidateError::Field(points_key))?;
        points.push(Point(x, y));
    }

    let color = obj
        .get("color")
        .and_then(Value::as_str)
        .filter(|c| is_hex_color(c))
        .map(str::to_owned)
        .ok_or(ValidateError::Field("color"))?;

    let stroke_width = obj
        .get("strokeWidth")
        .and_then(finite)
        .filter(|w| *w > 0.0 && *w <= 100.0)
        .ok_or(ValidateError::Field("strokeWidth"))?;

    Ok((points, color, stroke_width))
}

fn region_field(obj: &Map<String, Value>) -> Result<Region, ValidateError> {
    let region = obj
        .get("region")
        .and_then(Value::as_object)
        .ok_or(ValidateError::Field("region"))?;

    let get = |key: &'static str| -> Result<f64, ValidateError> {
        region
            .get(key)
            .and_then(finite)
            .ok_or(ValidateError::Field("region"))
    };

    let (x, y, width, height) = (get("x")?, get("y")?, get("width")?, get("height")?);
    if width <= 0.0 || height <= 0.0 {
        return Err(ValidateError::Field("region"));
    }
    Ok(Region {
        x,
        y,
        width,
        height,
    })
}
