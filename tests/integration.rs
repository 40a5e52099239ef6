//! End-to-end tests over real sockets.
//!
//! Each test boots a server on a free port and connects real clients,
//! exercising the full pipeline: decode → membership → validate → resolve
//! → sequence → append → fan-out.

use easel_collab::client::{ClientEvent, WhiteboardClient};
use easel_collab::protocol::{Event, EventBody, Point, Region, Stroke};
use easel_collab::server::{ServerConfig, WhiteboardServer};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server with the given config on a free port, return the port.
async fn start_test_server_with(mut config: ServerConfig) -> u16 {
    let port = free_port().await;
    config.bind_addr = format!("127.0.0.1:{port}");
    let server = WhiteboardServer::new(config);
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give server time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

async fn start_test_server() -> u16 {
    start_test_server_with(ServerConfig::default()).await
}

/// Connect a client and consume the CONNECTED handshake.
async fn connected_client(
    port: u16,
    user_id: &str,
) -> (WhiteboardClient, mpsc::Receiver<ClientEvent>) {
    let url = format!("ws://127.0.0.1:{port}");
    let mut client = WhiteboardClient::new(user_id, url);
    let mut rx = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    match recv(&mut rx).await {
        ClientEvent::Connected { .. } => {}
        other => panic!("expected CONNECTED first, got {other:?}"),
    }
    (client, rx)
}

async fn recv(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event stream ended")
}

/// Join a room and return the ROOM_JOINED payload.
async fn join(
    client: &WhiteboardClient,
    rx: &mut mpsc::Receiver<ClientEvent>,
    room_id: &str,
) -> (usize, Vec<Event>) {
    client.join_room(room_id).await.unwrap();
    loop {
        match recv(rx).await {
            ClientEvent::RoomJoined {
                room_id: joined,
                user_count,
                state,
            } => {
                assert_eq!(joined, room_id);
                return (user_count, state);
            }
            ClientEvent::Error(e) => panic!("join failed: {e}"),
            _ => {}
        }
    }
}

async fn next_board_event(rx: &mut mpsc::Receiver<ClientEvent>) -> Event {
    loop {
        match recv(rx).await {
            ClientEvent::Event(event) => return event,
            ClientEvent::Error(e) => panic!("unexpected error: {e}"),
            _ => {}
        }
    }
}

async fn next_error(rx: &mut mpsc::Receiver<ClientEvent>) -> String {
    loop {
        match recv(rx).await {
            ClientEvent::Error(error) => return error,
            ClientEvent::Event(e) => panic!("expected an error, got event {e:?}"),
            _ => {}
        }
    }
}

fn line(points: Vec<Point>) -> EventBody {
    EventBody::DrawLine(Stroke {
        points,
        color: "#112233".to_string(),
        stroke_width: 2.0,
    })
}

#[tokio::test]
async fn test_connected_handshake() {
    let port = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");

    let mut client = WhiteboardClient::new("alice", url);
    let mut rx = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    match recv(&mut rx).await {
        ClientEvent::Connected {
            session_id,
            message,
        } => {
            assert!(!session_id.is_nil());
            assert!(!message.is_empty());
        }
        other => panic!("expected CONNECTED, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_empty_room() {
    let port = start_test_server().await;
    let (client, mut rx) = connected_client(port, "alice").await;

    let (user_count, state) = join(&client, &mut rx, "r1").await;
    assert_eq!(user_count, 1);
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_two_concurrent_draws() {
    let port = start_test_server().await;
    let (alice, mut alice_rx) = connected_client(port, "alice").await;
    let (bob, mut bob_rx) = connected_client(port, "bob").await;

    join(&alice, &mut alice_rx, "r1").await;
    let (user_count, _) = join(&bob, &mut bob_rx, "r1").await;
    assert_eq!(user_count, 2);

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
        .await
        .unwrap();
    bob.send_event(line(vec![Point(2.0, 2.0), Point(3.0, 3.0)]))
        .await
        .unwrap();

    // Both members receive both events, in sequence order
    for rx in [&mut alice_rx, &mut bob_rx] {
        let first = next_board_event(rx).await;
        let second = next_board_event(rx).await;
        assert_eq!(first.sequence, Some(1));
        assert_eq!(second.sequence, Some(2));

        let mut users: Vec<&str> = vec![&first.user_id, &second.user_id]
            .into_iter()
            .map(String::as_str)
            .collect();
        users.sort();
        assert_eq!(users, ["alice", "bob"]);
    }
}

#[tokio::test]
async fn test_sender_receives_own_echo_with_sequence() {
    let port = start_test_server().await;
    let (alice, mut rx) = connected_client(port, "alice").await;
    join(&alice, &mut rx, "r1").await;

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(5.0, 5.0)]))
        .await
        .unwrap();

    let echoed = next_board_event(&mut rx).await;
    assert_eq!(echoed.user_id, "alice");
    assert_eq!(echoed.room_id, "r1");
    assert_eq!(echoed.sequence, Some(1));
    assert!(echoed.timestamp > 0);
}

#[tokio::test]
async fn test_double_clear_within_cooldown() {
    let port = start_test_server().await;
    let (alice, mut alice_rx) = connected_client(port, "alice").await;
    let (bob, mut bob_rx) = connected_client(port, "bob").await;
    join(&alice, &mut alice_rx, "r1").await;
    join(&bob, &mut bob_rx, "r1").await;

    alice.send_event(EventBody::ClearCanvas).await.unwrap();
    let accepted = next_board_event(&mut alice_rx).await;
    assert_eq!(accepted.sequence, Some(1));
    // Bob sees the broadcast of alice's clear too
    assert_eq!(next_board_event(&mut bob_rx).await.sequence, Some(1));

    // Second clear lands well inside the 1s cooldown
    bob.send_event(EventBody::ClearCanvas).await.unwrap();
    let error = next_error(&mut bob_rx).await;
    assert_eq!(error, "Event rejected due to conflict resolution");

    // The log still holds exactly the first clear
    let (charlie, mut charlie_rx) = connected_client(port, "charlie").await;
    let (_, state) = join(&charlie, &mut charlie_rx, "r1").await;
    assert_eq!(state.len(), 1);
    assert!(matches!(state[0].body, EventBody::ClearCanvas));
}

#[tokio::test]
async fn test_clear_after_draw_both_accepted() {
    let port = start_test_server().await;
    let (alice, mut rx) = connected_client(port, "alice").await;
    join(&alice, &mut rx, "r1").await;

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
        .await
        .unwrap();
    alice.send_event(EventBody::ClearCanvas).await.unwrap();

    let first = next_board_event(&mut rx).await;
    let second = next_board_event(&mut rx).await;
    assert_eq!(first.sequence, Some(1));
    assert!(matches!(first.body, EventBody::DrawLine(_)));
    assert_eq!(second.sequence, Some(2));
    assert!(matches!(second.body, EventBody::ClearCanvas));
}

#[tokio::test]
async fn test_second_clear_outside_cooldown_accepted() {
    let config = ServerConfig {
        clear_cooldown_ms: 100,
        ..ServerConfig::default()
    };
    let port = start_test_server_with(config).await;
    let (alice, mut rx) = connected_client(port, "alice").await;
    join(&alice, &mut rx, "r1").await;

    alice.send_event(EventBody::ClearCanvas).await.unwrap();
    assert_eq!(next_board_event(&mut rx).await.sequence, Some(1));

    tokio::time::sleep(Duration::from_millis(150)).await;
    alice.send_event(EventBody::ClearCanvas).await.unwrap();
    assert_eq!(next_board_event(&mut rx).await.sequence, Some(2));
}

#[tokio::test]
async fn test_invalid_color_rejected() {
    let port = start_test_server().await;
    let (alice, mut rx) = connected_client(port, "alice").await;
    join(&alice, &mut rx, "r1").await;

    alice
        .send_event(EventBody::DrawLine(Stroke {
            points: vec![Point(0.0, 0.0), Point(1.0, 1.0)],
            color: "red".to_string(),
            stroke_width: 2.0,
        }))
        .await
        .unwrap();
    assert_eq!(next_error(&mut rx).await, "Invalid event");

    // Nothing was stored or broadcast
    let (bob, mut bob_rx) = connected_client(port, "bob").await;
    let (_, state) = join(&bob, &mut bob_rx, "r1").await;
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_event_without_room_rejected() {
    let port = start_test_server().await;
    let (alice, mut rx) = connected_client(port, "alice").await;

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
        .await
        .unwrap();
    assert_eq!(next_error(&mut rx).await, "Not in a room");
}

#[tokio::test]
async fn test_erase_roundtrip() {
    let port = start_test_server().await;
    let (alice, mut rx) = connected_client(port, "alice").await;
    join(&alice, &mut rx, "r1").await;

    alice
        .send_event(EventBody::Erase {
            region: Region {
                x: 10.0,
                y: 20.0,
                width: 30.0,
                height: 40.0,
            },
        })
        .await
        .unwrap();

    let event = next_board_event(&mut rx).await;
    match event.body {
        EventBody::Erase { region } => {
            assert_eq!(region.width, 30.0);
            assert_eq!(region.height, 40.0);
        }
        other => panic!("expected ERASE, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cross_room_isolation() {
    let port = start_test_server().await;
    let (alice, mut alice_rx) = connected_client(port, "alice").await;
    let (bob, mut bob_rx) = connected_client(port, "bob").await;

    join(&alice, &mut alice_rx, "r1").await;
    join(&bob, &mut bob_rx, "r2").await;

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
        .await
        .unwrap();
    bob.send_event(line(vec![Point(2.0, 2.0), Point(3.0, 3.0)]))
        .await
        .unwrap();

    // Each room sequences independently from 1, and neither member sees
    // the other room's event
    let alice_event = next_board_event(&mut alice_rx).await;
    assert_eq!(alice_event.user_id, "alice");
    assert_eq!(alice_event.room_id, "r1");
    assert_eq!(alice_event.sequence, Some(1));

    let bob_event = next_board_event(&mut bob_rx).await;
    assert_eq!(bob_event.user_id, "bob");
    assert_eq!(bob_event.room_id, "r2");
    assert_eq!(bob_event.sequence, Some(1));

    assert!(
        timeout(Duration::from_millis(200), alice_rx.recv())
            .await
            .is_err(),
        "alice saw traffic from another room"
    );
}

#[tokio::test]
async fn test_rejoin_catch_up() {
    let port = start_test_server().await;
    let (mut alice, mut rx) = connected_client(port, "alice").await;
    join(&alice, &mut rx, "r1").await;

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
        .await
        .unwrap();
    alice
        .send_event(line(vec![Point(2.0, 2.0), Point(3.0, 3.0)]))
        .await
        .unwrap();
    next_board_event(&mut rx).await;
    next_board_event(&mut rx).await;

    alice.disconnect();
    // Let the server process the close
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A fresh connection sees the history with the original sequences
    let (alice2, mut rx2) = connected_client(port, "alice").await;
    let (user_count, state) = join(&alice2, &mut rx2, "r1").await;
    assert_eq!(user_count, 1);
    assert_eq!(state.len(), 2);
    assert_eq!(state[0].sequence, Some(1));
    assert_eq!(state[1].sequence, Some(2));
}

#[tokio::test]
async fn test_leave_stops_delivery() {
    let port = start_test_server().await;
    let (alice, mut alice_rx) = connected_client(port, "alice").await;
    let (bob, mut bob_rx) = connected_client(port, "bob").await;
    join(&alice, &mut alice_rx, "r1").await;
    join(&bob, &mut bob_rx, "r1").await;

    bob.leave_room("r1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
        .await
        .unwrap();
    next_board_event(&mut alice_rx).await;

    assert!(
        timeout(Duration::from_millis(200), bob_rx.recv())
            .await
            .is_err(),
        "bob received an event after leaving"
    );
}

#[tokio::test]
async fn test_malformed_frames_get_error_replies() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let port = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    let handshake = timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(handshake.to_text().unwrap().contains("CONNECTED"));

    // Unparseable JSON, a frame with no type, and an unknown type all get
    // the same frame-level error; the connection stays open throughout.
    for bad in ["not json", r#"{"userId":"u1"}"#, r#"{"type":"SPRAY_PAINT"}"#] {
        ws.send(Message::Text(bad.to_string().into())).await.unwrap();
        let reply = timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = reply.to_text().unwrap();
        assert!(text.contains("Invalid message format"), "{bad} -> {text}");
    }
}

#[tokio::test]
async fn test_log_saturation_surfaces_to_submitter() {
    let config = ServerConfig {
        max_events_per_room: 2,
        ..ServerConfig::default()
    };
    let port = start_test_server_with(config).await;
    let (alice, mut rx) = connected_client(port, "alice").await;
    join(&alice, &mut rx, "r1").await;

    for _ in 0..2 {
        alice
            .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
            .await
            .unwrap();
        next_board_event(&mut rx).await;
    }

    alice
        .send_event(line(vec![Point(0.0, 0.0), Point(1.0, 1.0)]))
        .await
        .unwrap();
    assert_eq!(next_error(&mut rx).await, "Room event log is full");
}
