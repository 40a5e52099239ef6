//! Conflict resolution for candidate events against a room's log.
//!
//! A deterministic, referentially transparent decision function: it never
//! reads the clock, only the candidate's own (server-stamped) timestamp and
//! the log it is handed. Drawing events never conflict; `CLEAR_CANVAS` is
//! debounced so that two users clearing within one human reaction time do
//! not wipe the canvas twice.

use crate::protocol::{Event, EventBody};

/// Minimum timestamp gap between two accepted `CLEAR_CANVAS` events.
pub const DEFAULT_CLEAR_COOLDOWN_MS: i64 = 1_000;

/// Decide whether `candidate` may be appended after `existing`.
///
/// Returns `false` when the candidate must be dropped. A `CLEAR_CANVAS` is
/// dropped iff the most recent stored `CLEAR_CANVAS` *by timestamp* differs
/// from the candidate's timestamp by strictly less than `cooldown_ms`; a gap
/// of exactly the cooldown is accepted. Control events never reach this
/// function (the coordinator refuses them earlier).
pub fn resolve(existing: &[Event], candidate: &Event, cooldown_ms: i64) -> bool {
    match candidate.body {
        EventBody::ClearCanvas => {
            let last_clear = existing
                .iter()
                .filter(|e| matches!(e.body, EventBody::ClearCanvas))
                .map(|e| e.timestamp)
                .max();
            match last_clear {
                Some(t) => (candidate.timestamp - t).abs() >= cooldown_ms,
                None => true,
            }
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Point, Stroke};

    fn clear_at(timestamp: i64) -> Event {
        Event::new(EventBody::ClearCanvas, "u1", "r1", timestamp)
    }

    fn draw_at(timestamp: i64) -> Event {
        Event::new(
            EventBody::DrawLine(Stroke {
                points: vec![Point(0.0, 0.0), Point(1.0, 1.0)],
                color: "#000000".to_string(),
                stroke_width: 1.0,
            }),
            "u1",
            "r1",
            timestamp,
        )
    }

    #[test]
    fn test_drawing_events_always_accepted() {
        let log = vec![draw_at(0), clear_at(10)];
        assert!(resolve(&log, &draw_at(10), DEFAULT_CLEAR_COOLDOWN_MS));
        assert!(resolve(&log, &draw_at(11), DEFAULT_CLEAR_COOLDOWN_MS));
    }

    #[test]
    fn test_first_clear_accepted() {
        assert!(resolve(&[], &clear_at(0), DEFAULT_CLEAR_COOLDOWN_MS));
        assert!(resolve(
            &[draw_at(0)],
            &clear_at(1),
            DEFAULT_CLEAR_COOLDOWN_MS
        ));
    }

    #[test]
    fn test_clear_within_cooldown_rejected() {
        let log = vec![clear_at(1_000)];
        assert!(!resolve(&log, &clear_at(1_200), DEFAULT_CLEAR_COOLDOWN_MS));
        assert!(!resolve(&log, &clear_at(1_999), DEFAULT_CLEAR_COOLDOWN_MS));
        // Equal timestamps differ by zero
        assert!(!resolve(&log, &clear_at(1_000), DEFAULT_CLEAR_COOLDOWN_MS));
    }

    #[test]
    fn test_clear_at_exactly_cooldown_accepted() {
        let log = vec![clear_at(1_000)];
        assert!(resolve(&log, &clear_at(2_000), DEFAULT_CLEAR_COOLDOWN_MS));
        assert!(resolve(&log, &clear_at(3_500), DEFAULT_CLEAR_COOLDOWN_MS));
    }

    #[test]
    fn test_compares_against_most_recent_clear_by_timestamp() {
        // Append order and timestamp order can disagree; the debounce keys
        // on the largest stored timestamp.
        let log = vec![clear_at(5_000), draw_at(5_100), clear_at(3_000)];
        assert!(!resolve(&log, &clear_at(5_500), DEFAULT_CLEAR_COOLDOWN_MS));
        assert!(resolve(&log, &clear_at(6_000), DEFAULT_CLEAR_COOLDOWN_MS));
    }

    #[test]
    fn test_custom_cooldown() {
        let log = vec![clear_at(0)];
        assert!(resolve(&log, &clear_at(50), 50));
        assert!(!resolve(&log, &clear_at(49), 50));
    }
}
