//! # easel-collab — real-time collaborative whiteboard backend
//!
//! Many clients connect over WebSocket, join a named room, and emit drawing
//! events. The server totally orders each room's events, validates and
//! conflict-resolves them, retains the ordered log in memory, and fans every
//! accepted event out to the room's members, the originator included, which
//! is how thin optimistic clients learn their assigned sequence numbers and
//! converge.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   WebSocket (JSON)   ┌──────────────────┐
//! │ Client A   │ ◄──────────────────► │ Session loop     │
//! │ Client B   │ ◄──────────────────► │ (one per socket) │
//! └────────────┘                      └────────┬─────────┘
//!                                              │
//!                 ┌──────────────┐    ┌────────▼─────────┐
//!                 │ Membership   │◄───┤ RoomRegistry     │
//!                 │ Table        │    │  room → RoomCoordinator
//!                 └──────┬───────┘    │   validate → resolve
//!                        │            │   → sequence → append
//!                 ┌──────▼───────┐    └────────┬─────────┘
//!                 │ Fanout       │◄────────────┘
//!                 │ (all members)│
//!                 └──────────────┘
//! ```
//!
//! Per room, every mutation runs inside one critical section, so sequence
//! numbers match append order and broadcast order. Rooms are independent
//! and proceed in parallel. The admin HTTP surface shares the same registry
//! and fan-out, so events posted over HTTP are visible to socket clients.
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire model: events, server messages, codec
//! - [`validate`] — structural and semantic validation of inbound events
//! - [`resolve`] — conflict resolution (clear-canvas debounce)
//! - [`room`] — sequence allocator, event log, room coordinator
//! - [`registry`] — room id → coordinator
//! - [`session`] — per-socket handle with bounded outbound queue
//! - [`membership`] — room ↔ session tracking
//! - [`broadcast`] — fan-out to room members
//! - [`server`] — WebSocket server
//! - [`admin`] — administrative HTTP router
//! - [`client`] — WebSocket client

pub mod admin;
pub mod broadcast;
pub mod client;
pub mod membership;
pub mod protocol;
pub mod registry;
pub mod resolve;
pub mod room;
pub mod server;
pub mod session;
pub mod validate;

// Re-exports for convenience
pub use admin::AdminState;
pub use broadcast::{Fanout, FanoutStats};
pub use client::{ClientEvent, ConnectionState, WhiteboardClient};
pub use membership::MembershipTable;
pub use protocol::{
    now_ms, Event, EventBody, PathStroke, Point, ProtocolError, Region, ServerMessage, Stroke,
};
pub use registry::RoomRegistry;
pub use resolve::{resolve, DEFAULT_CLEAR_COOLDOWN_MS};
pub use room::{EventLog, RoomCoordinator, SequenceAllocator, SubmitError};
pub use server::{ServerConfig, ServerStats, WhiteboardServer};
pub use session::{Delivery, Session};
pub use validate::{is_hex_color, validate_event, Limits, ValidateError};
