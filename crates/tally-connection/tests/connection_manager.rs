//! Integration tests for the connection manager, driven by an in-memory
//! transport whose dial outcomes are scripted per test.
//!
//! All tests run with Tokio's clock paused, so reconnect backoff sleeps
//! complete instantly while still observing their computed delays.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tally_connection::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager,
    ConnectionState, DisconnectReason, EventType, FailureKind, Identity,
    ReconnectConfig,
};
use tally_protocol::{ClientMessage, MessageType, ServerMessage, VoteValue};
use tally_transport::{
    CloseInfo, Connection, ConnectionId, Connector, Incoming, TransportError,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

// =========================================================================
// Mock transport
// =========================================================================

struct MockConnection {
    id: ConnectionId,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl Connection for MockConnection {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        self.sent
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed("peer gone".into()))
    }

    async fn recv(&self) -> Result<Incoming, TransportError> {
        let mut incoming = self.incoming.lock().await;
        Ok(incoming.recv().await.unwrap_or(Incoming::Closed(None)))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The test's side of one mock socket.
struct MockServer {
    incoming: mpsc::UnboundedSender<Incoming>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    fn push(&self, frame: &str) {
        self.incoming
            .send(Incoming::Data(frame.as_bytes().to_vec()))
            .unwrap();
    }

    fn close_with(&self, code: u16, reason: &str) {
        self.incoming
            .send(Incoming::Closed(Some(CloseInfo::new(code, reason))))
            .unwrap();
    }

    fn drop_socket(&self) {
        self.incoming.send(Incoming::Closed(None)).unwrap();
    }

    async fn next_sent(&mut self) -> serde_json::Value {
        let frame = timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("timed out waiting for a sent frame")
            .expect("connection dropped");
        serde_json::from_str(&frame).unwrap()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

enum Dial {
    Open(MockConnection),
    Reject(u16),
}

#[derive(Clone, Default)]
struct MockConnector {
    inner: Arc<ConnectorInner>,
}

#[derive(Default)]
struct ConnectorInner {
    script: Mutex<VecDeque<Dial>>,
    urls: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl MockConnector {
    /// Scripts the next dial to succeed and returns the server side.
    fn accept_next(&self) -> MockServer {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let conn = MockConnection {
            id: ConnectionId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst)),
            incoming: tokio::sync::Mutex::new(incoming_rx),
            sent: sent_tx,
            closed: Arc::clone(&closed),
        };
        self.inner.script.lock().unwrap().push_back(Dial::Open(conn));
        MockServer {
            incoming: incoming_tx,
            sent: sent_rx,
            closed,
        }
    }

    fn reject_next(&self, status: u16) {
        self.inner
            .script
            .lock()
            .unwrap()
            .push_back(Dial::Reject(status));
    }

    fn dials(&self) -> usize {
        self.inner.urls.lock().unwrap().len()
    }

    fn urls(&self) -> Vec<String> {
        self.inner.urls.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, url: &str) -> Result<MockConnection, TransportError> {
        self.inner.urls.lock().unwrap().push(url.to_string());
        let next = self.inner.script.lock().unwrap().pop_front();
        match next {
            Some(Dial::Open(conn)) => Ok(conn),
            Some(Dial::Reject(status)) => Err(TransportError::Rejected { status }),
            // An unscripted dial behaves like a server that is down.
            None => Err(TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    manager: ConnectionManager<MockConnector>,
    connector: MockConnector,
    messages: mpsc::UnboundedReceiver<ServerMessage>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

fn config(max_attempts: u32) -> ConnectionConfig {
    ConnectionConfig {
        server_url: "ws://tally.test/".to_string(),
        reconnect: ReconnectConfig {
            max_attempts,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        },
        shutdown_timeout_ms: 1_000,
    }
}

fn harness(max_attempts: u32) -> Harness {
    let connector = MockConnector::default();
    Harness {
        manager: ConnectionManager::new(connector.clone(), config(max_attempts)),
        connector,
        messages: mpsc::unbounded_channel().1,
        events: mpsc::unbounded_channel().1,
    }
}

impl Harness {
    async fn connect(&mut self, room: &str, identity: Identity) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.messages = msg_rx;
        self.events = event_rx;
        self.manager
            .connect(
                room,
                identity,
                move |msg: &ServerMessage| {
                    let _ = msg_tx.send(msg.clone());
                },
                move |event: &ConnectionEvent| {
                    let _ = event_tx.send(event.clone());
                },
            )
            .await
            .unwrap();
    }

    async fn next_event(&mut self) -> ConnectionEvent {
        timeout(Duration::from_secs(120), self.events.recv())
            .await
            .expect("timed out waiting for a connection event")
            .expect("event channel closed")
    }

    async fn next_message(&mut self) -> ServerMessage {
        timeout(Duration::from_secs(5), self.messages.recv())
            .await
            .expect("timed out waiting for a server message")
            .expect("message channel closed")
    }

    /// Skips events until one matching `event_type` arrives.
    async fn wait_for(&mut self, event_type: EventType) -> ConnectionEvent {
        loop {
            let event = self.next_event().await;
            if event.event_type() == event_type {
                return event;
            }
        }
    }
}

fn alice() -> Identity {
    Identity::new("alice")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_dials_room_url_and_sends_join() {
    let mut h = harness(5);
    let mut server = h.connector.accept_next();

    h.connect("sprint-12", alice().with_token("t0k")).await;

    assert!(matches!(
        h.next_event().await,
        ConnectionEvent::Connecting { attempt: 0 }
    ));
    assert!(matches!(h.next_event().await, ConnectionEvent::Connected { .. }));
    assert_eq!(h.manager.state(), ConnectionState::Open);
    assert_eq!(h.manager.room_key(), Some("sprint-12"));
    assert_eq!(h.connector.urls(), ["ws://tally.test/ws/sprint-12"]);

    let join = server.next_sent().await;
    assert_eq!(join["type"], "join");
    assert_eq!(join["userName"], "alice");
    assert_eq!(join["authToken"], "t0k");
}

#[tokio::test(start_paused = true)]
async fn test_connect_encodes_room_key_in_url() {
    let mut h = harness(5);
    let _server = h.connector.accept_next();

    h.connect("team/a?x#y", alice()).await;
    h.wait_for(EventType::Connected).await;

    assert_eq!(h.connector.urls(), ["ws://tally.test/ws/team%2Fa%3Fx%23y"]);
    assert_eq!(h.manager.room_key(), Some("team/a?x#y"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_with_blank_room_key_keeps_current_connection() {
    let mut h = harness(5);
    let server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    let result = h
        .manager
        .connect("  ", alice(), |_: &ServerMessage| {}, |_: &ConnectionEvent| {})
        .await;

    assert!(matches!(result, Err(ConnectionError::InvalidRoomKey(_))));
    assert_eq!(h.manager.state(), ConnectionState::Open);
    assert_eq!(h.manager.room_key(), Some("room"));
    assert!(!server.is_closed());
    assert_eq!(h.connector.urls(), ["ws://tally.test/ws/room"]);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_messages_reach_on_message() {
    let mut h = harness(5);
    let server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    server.push(r#"{"type":"roomUpdate","room":{"key":"room","showVotes":true}}"#);
    server.push(r#"{"type":"pong"}"#);

    let first = h.next_message().await;
    assert_eq!(first.message_type(), MessageType::RoomUpdate);
    assert!(first.snapshot().unwrap().show_votes);
    assert_eq!(h.next_message().await, ServerMessage::Pong);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_reported_and_skipped() {
    let mut h = harness(5);
    let server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    server.push("{ this is not json");
    server.push(r#"{"type":"pong"}"#);

    let ConnectionEvent::Error(failure) = h.next_event().await else {
        panic!("expected a protocol error event");
    };
    assert_eq!(failure.kind, FailureKind::Protocol);
    assert_eq!(h.next_message().await, ServerMessage::Pong);
    assert_eq!(h.manager.state(), ConnectionState::Open);
    assert_eq!(h.connector.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_socket_reconnects_with_backoff() {
    let mut h = harness(5);
    let first = h.connector.accept_next();
    let mut second = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    first.drop_socket();

    let ConnectionEvent::Error(failure) = h.next_event().await else {
        panic!("expected network error");
    };
    assert_eq!(failure.kind, FailureKind::Network);

    let ConnectionEvent::Reconnecting { attempt, delay } = h.next_event().await else {
        panic!("expected reconnecting");
    };
    assert_eq!(attempt, 1);
    assert!(
        delay >= Duration::from_millis(850) && delay <= Duration::from_millis(1_150),
        "first retry delay {delay:?} outside jitter bounds"
    );
    assert_eq!(h.manager.state(), ConnectionState::Reconnecting);

    assert!(matches!(
        h.next_event().await,
        ConnectionEvent::Connecting { attempt: 1 }
    ));
    assert!(matches!(h.next_event().await, ConnectionEvent::Connected { .. }));
    assert_eq!(second.next_sent().await["type"], "join");
    assert!(first.is_closed());
    assert_eq!(h.connector.dials(), 2);

    // A successful open resets the attempt counter.
    second.drop_socket();
    let ConnectionEvent::Reconnecting { attempt, .. } =
        h.wait_for(EventType::Reconnecting).await
    else {
        unreachable!();
    };
    assert_eq!(attempt, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_code_is_retried() {
    let mut h = harness(5);
    let first = h.connector.accept_next();
    let _second = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    first.close_with(1011, "server restarting");

    let ConnectionEvent::Error(failure) = h.next_event().await else {
        panic!("expected network error");
    };
    assert_eq!(failure.kind, FailureKind::Network);
    assert_eq!(failure.close_code, Some(1011));
    h.wait_for(EventType::Reconnecting).await;
    h.wait_for(EventType::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_close_code_is_terminal() {
    let mut h = harness(5);
    let server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    server.close_with(4001, "invalid session token");

    let ConnectionEvent::Error(failure) = h.next_event().await else {
        panic!("expected auth error");
    };
    assert_eq!(failure.kind, FailureKind::Auth);
    assert_eq!(failure.close_code, Some(4001));
    let ConnectionEvent::Disconnected { reason } = h.next_event().await else {
        panic!("expected disconnected");
    };
    assert_eq!(reason, DisconnectReason::AuthFailed);
    assert_eq!(h.manager.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_payload_is_terminal() {
    let mut h = harness(5);
    let server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    server.push(r#"{"type":"error","reason":"auth","message":"token expired"}"#);

    let ServerMessage::Error(payload) = h.next_message().await else {
        panic!("expected the error message to be delivered");
    };
    assert_eq!(payload.description(), "token expired");

    let ConnectionEvent::Disconnected { reason } = h.wait_for(EventType::Disconnected).await
    else {
        unreachable!();
    };
    assert_eq!(reason, DisconnectReason::AuthFailed);
    assert!(server.is_closed());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_handshake_is_terminal() {
    let mut h = harness(5);
    h.connector.reject_next(401);
    h.connect("room", alice()).await;

    let ConnectionEvent::Error(failure) = h.wait_for(EventType::Error).await else {
        unreachable!();
    };
    assert_eq!(failure.kind, FailureKind::Auth);
    let ConnectionEvent::Disconnected { reason } = h.next_event().await else {
        panic!("expected disconnected");
    };
    assert_eq!(reason, DisconnectReason::AuthFailed);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_requested_disconnect_is_terminal() {
    let mut h = harness(5);
    let server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    server.push(r#"{"type":"error","reason":"disconnect","message":"room deleted"}"#);

    let ConnectionEvent::Disconnected { reason } = h.wait_for(EventType::Disconnected).await
    else {
        unreachable!();
    };
    assert_eq!(reason, DisconnectReason::ServerRequested("room deleted".into()));
    assert_eq!(h.manager.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let mut h = harness(3);
    h.connect("room", alice()).await;

    let mut connecting = 0;
    let mut delays = Vec::new();
    let reason = loop {
        match h.next_event().await {
            ConnectionEvent::Connecting { attempt } => {
                assert_eq!(attempt, connecting);
                connecting += 1;
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt as usize, delays.len() + 1);
                delays.push(delay);
            }
            ConnectionEvent::Disconnected { reason } => break reason,
            ConnectionEvent::Error(failure) => assert!(failure.is_retryable()),
            other => panic!("unexpected event {other:?}"),
        }
    };

    assert_eq!(reason, DisconnectReason::Exhausted { attempts: 3 });
    assert_eq!(connecting, 4);
    assert_eq!(h.connector.dials(), 4);
    assert_eq!(h.manager.state(), ConnectionState::Closed);

    let nominal = [1_000u64, 2_000, 4_000];
    for (delay, nominal) in delays.iter().zip(nominal) {
        let ms = delay.as_millis() as u64;
        assert!(
            ms * 100 >= nominal * 85 && ms * 100 <= nominal * 115,
            "{ms} ms outside jitter bounds of {nominal} ms"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_open_connection() {
    let mut h = harness(5);
    let vote = ClientMessage::Vote {
        value: Some(VoteValue::new("5")),
        structured_vote: None,
    };
    assert!(matches!(
        h.manager.send(&vote),
        Err(ConnectionError::NotConnected)
    ));

    let mut server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;
    assert_eq!(server.next_sent().await["type"], "join");

    h.manager.send(&vote).unwrap();
    let frame = server.next_sent().await;
    assert_eq!(frame["type"], "vote");
    assert_eq!(frame["value"], "5");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_tears_everything_down() {
    let mut h = harness(5);
    let server = h.connector.accept_next();
    h.connect("room", alice()).await;
    h.wait_for(EventType::Connected).await;

    h.manager.disconnect().await;

    assert_eq!(h.manager.state(), ConnectionState::Closed);
    assert!(server.is_closed());
    assert!(h.manager.room_key().is_none());
    assert!(matches!(
        h.manager.send(&ClientMessage::Ping),
        Err(ConnectionError::NotConnected)
    ));

    // No listener survives teardown.
    let _ = server.incoming.send(Incoming::Data(br#"{"type":"pong"}"#.to_vec()));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.messages.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_new_connect_cancels_pending_reconnect() {
    let mut h = harness(5);
    let first = h.connector.accept_next();
    h.connect("room-a", alice()).await;
    h.wait_for(EventType::Connected).await;

    first.drop_socket();
    h.wait_for(EventType::Reconnecting).await;

    let _second = h.connector.accept_next();
    h.connect("room-b", alice()).await;
    h.wait_for(EventType::Connected).await;

    // Long enough for the old retry to have fired if it were still pending.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(
        h.connector.urls(),
        ["ws://tally.test/ws/room-a", "ws://tally.test/ws/room-b"]
    );
    assert_eq!(h.manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_adds_listener_for_one_message_type() {
    let mut h = harness(5);
    assert!(h.manager.subscribe(EventType::Connected, |_| {}).is_err());

    let server = h.connector.accept_next();
    h.connect("room", alice()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.manager
        .subscribe(EventType::Message(MessageType::TimerUpdate), move |event| {
            let _ = tx.send(event.clone());
        })
        .unwrap();
    h.wait_for(EventType::Connected).await;

    server.push(r#"{"type":"pong"}"#);
    server.push(r#"{"type":"timerUpdate","timerState":{"running":true,"seconds":12}}"#);

    let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    let Some(ServerMessage::TimerUpdate { timer_state }) = event.as_message() else {
        panic!("expected timer update, got {event:?}");
    };
    assert_eq!(timer_state.seconds, 12);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_watch_state_observes_transitions() {
    let mut h = harness(5);
    let mut state = h.manager.watch_state();
    assert_eq!(*state.borrow(), ConnectionState::Idle);

    let _server = h.connector.accept_next();
    h.connect("room", alice()).await;

    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Open),
    )
    .await
    .unwrap()
    .unwrap();
}
