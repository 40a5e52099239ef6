//! WebSocket whiteboard server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                         ┌── Session A (outbound queue)
//!             ├── Session loop ──┐     │
//! Client B ──┘                   ▼     │
//!                        RoomRegistry  │
//!                              │       │
//!                     RoomCoordinator ─┤  validate → resolve → seq → append
//!                              │       │
//!                           Fanout ────┴── every member, sender included
//! ```
//!
//! One task per connection decodes inbound frames serially and dispatches:
//! control frames (JOIN_ROOM / LEAVE_ROOM) go to the membership table and
//! registry; whiteboard frames are stamped with the session's room and the
//! server clock, validated, and submitted to the room's coordinator, which
//! broadcasts on acceptance. Each socket's outbound traffic is drained by
//! its own loop, so writes never interleave.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::Fanout;
use crate::membership::MembershipTable;
use crate::protocol::{now_ms, ServerMessage};
use crate::registry::RoomRegistry;
use crate::session::Session;
use crate::validate::{validate_event, Limits, DEFAULT_MAX_POINTS};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket bind address
    pub bind_addr: String,
    /// Administrative HTTP bind address
    pub admin_addr: String,
    /// Outbound queue capacity per session
    pub outbound_capacity: usize,
    /// Reject inbound frames larger than this
    pub max_event_bytes: usize,
    /// Reject strokes with more coordinate pairs than this
    pub max_points_per_event: usize,
    /// Soft cap on stored events per room
    pub max_events_per_room: usize,
    /// Minimum timestamp gap between accepted CLEAR_CANVAS events
    pub clear_cooldown_ms: i64,
    /// Server-initiated ping interval
    pub heartbeat_interval_secs: u64,
    /// Grace beyond the interval before an unresponsive socket is dropped
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            admin_addr: "127.0.0.1:9091".to_string(),
            outbound_capacity: 256,
            max_event_bytes: 100 * 1024,
            max_points_per_event: DEFAULT_MAX_POINTS,
            max_events_per_room: 10_000,
            clear_cooldown_ms: 1_000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 10,
        }
    }
}

/// Server-wide counters.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub frames_received: u64,
    pub events_accepted: u64,
    pub events_rejected: u64,
}

/// The whiteboard server: accept loop plus the shared core it hands to
/// every connection and to the admin HTTP surface. Exactly one registry,
/// membership table, and fan-out exist per process; every entry point is
/// wired to the same instances.
pub struct WhiteboardServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    membership: Arc<MembershipTable>,
    fanout: Arc<Fanout>,
    stats: Arc<RwLock<ServerStats>>,
}

impl WhiteboardServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new(
            config.max_events_per_room,
            config.clear_cooldown_ms,
        ));
        let membership = Arc::new(MembershipTable::new());
        let fanout = Arc::new(Fanout::new(membership.clone()));
        Self {
            config,
            registry,
            membership,
            fanout,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.registry.clone()
    }

    pub fn membership(&self) -> Arc<MembershipTable> {
        self.membership.clone()
    }

    pub fn fanout(&self) -> Arc<Fanout> {
        self.fanout.clone()
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Accept connections forever. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("whiteboard server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let config = self.config.clone();
            let registry = self.registry.clone();
            let membership = self.membership.clone();
            let fanout = self.fanout.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(
                    stream, addr, config, registry, membership, fanout, stats,
                )
                .await
                {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Drive one socket from open to close.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<RoomRegistry>,
        membership: Arc<MembershipTable>,
        fanout: Arc<Fanout>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (session, mut out_rx) = Session::new(config.outbound_capacity);
        log::info!("session {} connected from {addr}", session.id());

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let _ = session.send(&ServerMessage::connected(session.id()));

        let limits = Limits {
            max_points_per_event: config.max_points_per_event,
        };
        let heartbeat = Duration::from_secs(config.heartbeat_interval_secs);
        let quiet_limit = heartbeat + Duration::from_secs(config.heartbeat_timeout_secs);
        let mut ping_timer = interval_at(Instant::now() + heartbeat, heartbeat);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            last_inbound = Instant::now();
                            {
                                let mut s = stats.write().await;
                                s.frames_received += 1;
                            }
                            Self::handle_frame(
                                text.as_str(), &session, &config, &limits,
                                &registry, &membership, &fanout, &stats,
                            ).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            last_inbound = Instant::now();
                            let _ = session.send(&ServerMessage::error("Invalid message format"));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            last_inbound = Instant::now();
                            ws_sender.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_inbound = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::debug!("session {} closed by peer", session.id());
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::warn!("socket error from {addr}: {e}");
                            break;
                        }
                    }
                }

                outgoing = out_rx.recv() => {
                    match outgoing {
                        Some(frame) => {
                            ws_sender.send(Message::Text(frame.to_string().into())).await?;
                        }
                        None => break,
                    }
                }

                _ = ping_timer.tick() => {
                    if last_inbound.elapsed() > quiet_limit {
                        log::info!("session {} timed out", session.id());
                        break;
                    }
                    ws_sender.send(Message::Ping(Vec::new().into())).await?;
                }
            }
        }

        if let Some(room_id) = membership.disconnect(session.id()).await {
            log::info!("session {} disconnected from room {room_id}", session.id());
        } else {
            log::info!("session {} disconnected", session.id());
        }
        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
        }

        Ok(())
    }

    /// Decode and dispatch one inbound text frame. All replies go through
    /// the session's outbound queue; errors stay local to this session.
    async fn handle_frame(
        text: &str,
        session: &Session,
        config: &ServerConfig,
        limits: &Limits,
        registry: &RoomRegistry,
        membership: &MembershipTable,
        fanout: &Fanout,
        stats: &RwLock<ServerStats>,
    ) {
        if text.len() > config.max_event_bytes {
            let _ = session.send(&ServerMessage::error("Event too large"));
            return;
        }

        let frame: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                let _ = session.send(&ServerMessage::error("Invalid message format"));
                return;
            }
        };

        let kind = frame
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            "JOIN_ROOM" => Self::handle_join(&frame, session, registry, membership).await,
            "LEAVE_ROOM" => Self::handle_leave(&frame, session, membership).await,
            "DRAW_LINE" | "DRAW_PATH" | "ERASE" | "CLEAR_CANVAS" => {
                Self::handle_board_event(
                    frame, session, limits, registry, membership, fanout, stats,
                )
                .await;
            }
            _ => {
                let _ = session.send(&ServerMessage::error("Invalid message format"));
            }
        }
    }

    async fn handle_join(
        frame: &Value,
        session: &Session,
        registry: &RoomRegistry,
        membership: &MembershipTable,
    ) {
        let room_id = frame.get("roomId").and_then(Value::as_str).unwrap_or("");
        let user_id = frame.get("userId").and_then(Value::as_str).unwrap_or("");
        if room_id.is_empty() || user_id.is_empty() {
            let _ = session.send(&ServerMessage::error("Invalid event"));
            return;
        }

        membership.join(room_id, session.clone()).await;
        let coordinator = registry.get_or_create(room_id).await;
        let state = coordinator.state().await;
        let user_count = membership.user_count(room_id).await;

        log::info!(
            "session {} joined room {room_id} as {user_id} ({user_count} users, {} events)",
            session.id(),
            state.len()
        );
        let _ = session.send(&ServerMessage::room_joined(room_id, user_count, state));
    }

    async fn handle_leave(frame: &Value, session: &Session, membership: &MembershipTable) {
        let room_id = frame.get("roomId").and_then(Value::as_str).unwrap_or("");
        let user_id = frame.get("userId").and_then(Value::as_str).unwrap_or("");
        if room_id.is_empty() || user_id.is_empty() {
            let _ = session.send(&ServerMessage::error("Invalid event"));
            return;
        }

        membership.leave(room_id, session.id()).await;
        log::info!("session {} left room {room_id}", session.id());
    }

    async fn handle_board_event(
        mut frame: Value,
        session: &Session,
        limits: &Limits,
        registry: &RoomRegistry,
        membership: &MembershipTable,
        fanout: &Fanout,
        stats: &RwLock<ServerStats>,
    ) {
        let Some(room_id) = membership.room_of(session.id()).await else {
            let _ = session.send(&ServerMessage::error("Not in a room"));
            return;
        };

        // Server-authoritative header fields; client values are never
        // trusted for these.
        if let Some(obj) = frame.as_object_mut() {
            obj.insert("roomId".to_string(), Value::String(room_id.clone()));
            obj.insert("timestamp".to_string(), Value::from(now_ms()));
        }

        let event = match validate_event(&frame, limits) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("session {}: invalid event: {e}", session.id());
                let mut s = stats.write().await;
                s.events_rejected += 1;
                drop(s);
                let _ = session.send(&ServerMessage::error("Invalid event"));
                return;
            }
        };

        let coordinator = registry.get_or_create(&room_id).await;
        match coordinator.submit_and_publish(event, fanout).await {
            Ok(stored) => {
                let mut s = stats.write().await;
                s.events_accepted += 1;
                log::debug!(
                    "room {room_id}: {} #{} from {}",
                    stored.body.kind(),
                    stored.sequence.unwrap_or(0),
                    stored.user_id
                );
            }
            Err(e) => {
                let mut s = stats.write().await;
                s.events_rejected += 1;
                drop(s);
                let _ = session.send(&ServerMessage::error(e.to_string()));
            }
        }
    }
}
