//! WebSocket client for the whiteboard server.
//!
//! Connection lifecycle plus typed access to the server's frames. The
//! client applies events optimistically and reconciles when the server
//! echoes them back with an assigned sequence number, so the event stream
//! surfaces everything, including the client's own accepted events.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{now_ms, Event, EventBody, ProtocolError, ServerMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events surfaced to the application.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake complete; the server assigned us a session id.
    Connected { session_id: Uuid, message: String },
    /// We are in a room; `state` is the snapshot to replay.
    RoomJoined {
        room_id: String,
        user_count: usize,
        state: Vec<Event>,
    },
    /// An accepted, sequenced event, possibly our own echo.
    Event(Event),
    /// The server rejected one of our frames.
    Error(String),
    /// Connection lost.
    Disconnected,
}

/// The whiteboard client.
pub struct WhiteboardClient {
    user_id: String,
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl WhiteboardClient {
    pub fn new(user_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            user_id: user_id.into(),
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server and spawn the reader and writer tasks.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws_stream, _) = tokio_tungstenite::connect_async(self.server_url.as_str())
            .await
            .map_err(|_| {
                // Connection refused or handshake failure
                ProtocolError::ConnectionClosed
            })?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing frames to the socket
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            // Outgoing channel gone: close the socket politely so the
            // server drops us from membership right away.
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        *self.state.write().await = ConnectionState::Connected;

        // Reader task: decode server frames into client events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerMessage::decode(text.as_str()) {
                        Ok(message) => {
                            if let Some(event) = Self::to_client_event(message) {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("undecodable server frame: {e}");
                        }
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ClientEvent::Disconnected).await;
        });

        Ok(())
    }

    fn to_client_event(message: ServerMessage) -> Option<ClientEvent> {
        match message {
            ServerMessage::Connected {
                session_id,
                message,
            } => Some(ClientEvent::Connected {
                session_id,
                message,
            }),
            ServerMessage::RoomJoined {
                room_id,
                user_count,
                state,
                ..
            } => Some(ClientEvent::RoomJoined {
                room_id,
                user_count,
                state,
            }),
            ServerMessage::Event { event } => Some(ClientEvent::Event(event)),
            ServerMessage::Error { error } => Some(ClientEvent::Error(error)),
        }
    }

    /// Join a room. The server replies with ROOM_JOINED and the snapshot.
    pub async fn join_room(&self, room_id: &str) -> Result<(), ProtocolError> {
        self.send_event_to(EventBody::JoinRoom, room_id).await
    }

    /// Leave a room.
    pub async fn leave_room(&self, room_id: &str) -> Result<(), ProtocolError> {
        self.send_event_to(EventBody::LeaveRoom, room_id).await
    }

    /// Send a whiteboard event to the current room. The server substitutes
    /// the room and timestamp, so none need to be supplied here.
    pub async fn send_event(&self, body: EventBody) -> Result<(), ProtocolError> {
        self.send_event_to(body, "-").await
    }

    async fn send_event_to(&self, body: EventBody, room_id: &str) -> Result<(), ProtocolError> {
        let event = Event::new(body, self.user_id.clone(), room_id, now_ms());
        let text =
            serde_json::to_string(&event).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(text)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Close the connection. The writer task sends a Close frame once the
    /// outgoing channel drains.
    pub fn disconnect(&mut self) {
        self.outgoing_tx = None;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
