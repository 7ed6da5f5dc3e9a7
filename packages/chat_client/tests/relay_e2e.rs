//! End-to-end tests: real relay server on a loopback port, real clients.

use chat_client::{ChatView, ConnectionState, SessionConfig, SessionEvent, SessionHandle};
use chat_protocol::Envelope;
use chat_server::AppState;
use chat_server::config::ServerConfig;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{self, Message};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

struct TestRelay {
    url: String,
    state: AppState,
}

async fn start_relay(config: ServerConfig) -> TestRelay {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(config);
    let serve_state = state.clone();
    tokio::spawn(async move {
        chat_server::serve(listener, serve_state, std::future::pending())
            .await
            .unwrap();
    });
    TestRelay {
        url: format!("ws://{}", addr),
        state,
    }
}

impl TestRelay {
    async fn wait_for_sessions(&self, count: usize) {
        timeout(WAIT, async {
            while self.state.registry.len().await != count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("relay never reached {count} sessions"));
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session event channel closed")
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Envelope {
    match next_event(rx).await {
        SessionEvent::Message(envelope) => envelope,
        other => panic!("expected a message, got {other:?}"),
    }
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    if let Ok(Some(event)) = timeout(QUIET, rx.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

/// Connect a session and wait for the Connected event.
async fn join(
    relay: &TestRelay,
    name: &str,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
    let session = SessionHandle::new(SessionConfig::new(&relay.url));
    let mut events = session.subscribe();
    session.connect(name);
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
    assert_eq!(session.state(), ConnectionState::Connected);
    (session, events)
}

#[tokio::test]
async fn test_every_session_receives_each_message_once() {
    let relay = start_relay(ServerConfig::default()).await;

    let mut clients = Vec::new();
    for name in ["alice", "bob", "carol", "dave"] {
        clients.push(join(&relay, name).await);
    }
    relay.wait_for_sessions(4).await;

    assert!(clients[1].0.send("hello room"));

    for (_, events) in clients.iter_mut() {
        let envelope = next_message(events).await;
        assert_eq!(envelope, Envelope::new("bob", "hello room"));
        assert_quiet(events).await;
    }

    let snapshot = relay.state.metrics.snapshot();
    assert_eq!(snapshot.messages.relayed, 1);
    assert_eq!(snapshot.messages.deliveries, 4);
}

#[tokio::test]
async fn test_sender_order_is_preserved() {
    let relay = start_relay(ServerConfig::default()).await;
    let (alice, mut alice_events) = join(&relay, "alice").await;
    let (_bob, mut bob_events) = join(&relay, "bob").await;
    relay.wait_for_sessions(2).await;

    for i in 0..20 {
        assert!(alice.send(&format!("msg {i}")));
    }
    for events in [&mut alice_events, &mut bob_events] {
        for i in 0..20 {
            assert_eq!(next_message(events).await.text, format!("msg {i}"));
        }
    }
}

#[tokio::test]
async fn test_self_flag_in_chat_view() {
    let relay = start_relay(ServerConfig::default()).await;
    let (alice, mut alice_events) = join(&relay, "alice").await;
    let (bob, mut bob_events) = join(&relay, "bob").await;
    relay.wait_for_sessions(2).await;

    let mut alice_view = ChatView::new(alice.clone(), "alice");
    let mut bob_view = ChatView::new(bob.clone(), "bob");
    alice_view.apply(SessionEvent::Connected);
    bob_view.apply(SessionEvent::Connected);

    assert!(alice_view.send_message("hey"));
    let at_alice = next_event(&mut alice_events).await;
    let at_bob = next_event(&mut bob_events).await;
    alice_view.apply(at_alice);
    bob_view.apply(at_bob);

    assert_eq!(alice_view.messages().len(), 1);
    assert!(alice_view.messages()[0].is_self);
    assert_eq!(bob_view.messages().len(), 1);
    assert!(!bob_view.messages()[0].is_self);
    assert_eq!(bob_view.messages()[0].user, "alice");
    assert_eq!(bob_view.preview(), "hey");
}

#[tokio::test]
async fn test_blank_sends_never_reach_the_wire() {
    let relay = start_relay(ServerConfig::default()).await;
    let (alice, mut events) = join(&relay, "alice").await;
    relay.wait_for_sessions(1).await;

    assert!(!alice.send(""));
    assert!(!alice.send("   "));
    assert!(alice.send("  hi  "));

    assert_eq!(next_message(&mut events).await, Envelope::new("alice", "hi"));
    assert_eq!(relay.state.metrics.snapshot().messages.received, 1);
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_nothing_is_replayed() {
    let relay = start_relay(ServerConfig::default()).await;
    let (alice, mut alice_events) = join(&relay, "alice").await;
    let (bob, mut bob_events) = join(&relay, "bob").await;
    relay.wait_for_sessions(2).await;

    bob.disconnect();
    bob.disconnect();
    assert_eq!(bob.state(), ConnectionState::Disconnected);
    assert_eq!(next_event(&mut bob_events).await, SessionEvent::Disconnected);
    assert_quiet(&mut bob_events).await;
    relay.wait_for_sessions(1).await;

    // Sent while bob is away; must not be delivered later
    assert!(alice.send("while you were out"));
    assert_eq!(next_message(&mut alice_events).await.text, "while you were out");
    assert!(!bob.send("offline"));

    assert!(bob.reconnect());
    assert_eq!(next_event(&mut bob_events).await, SessionEvent::Connected);
    relay.wait_for_sessions(2).await;

    assert!(alice.send("welcome back"));
    assert_eq!(next_message(&mut bob_events).await.text, "welcome back");
}

#[tokio::test]
async fn test_server_side_close_reports_disconnected() {
    let relay = start_relay(ServerConfig::default()).await;
    let (alice, mut events) = join(&relay, "alice").await;
    relay.wait_for_sessions(1).await;

    let id = relay.state.registry.sessions().await[0].id;
    assert!(relay.state.registry.disconnect(id).await);

    assert_eq!(next_event(&mut events).await, SessionEvent::Disconnected);
    assert_eq!(alice.state(), ConnectionState::Disconnected);
    assert!(!alice.send("still there?"));
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn test_dropping_every_handle_closes_the_connection() {
    let relay = start_relay(ServerConfig::default()).await;
    let (alice, events) = join(&relay, "alice").await;
    let view = ChatView::new(alice.clone(), "alice");
    relay.wait_for_sessions(1).await;

    drop(alice);
    // The view still owns a handle, so the session stays up
    sleep(QUIET).await;
    assert_eq!(relay.state.registry.len().await, 1);

    drop(view);
    drop(events);
    relay.wait_for_sessions(0).await;
    assert_eq!(relay.state.metrics.snapshot().connections.active, 0);
}

#[tokio::test]
async fn test_graceful_shutdown_completes() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let state = AppState::default();
    let server = tokio::spawn(chat_server::serve(listener, state.clone(), async move {
        let _ = stop_rx.await;
    }));

    let session = SessionHandle::new(SessionConfig::new(&url));
    let mut events = session.subscribe();
    session.connect("alice");
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);

    stop_tx.send(()).unwrap();
    session.disconnect();
    assert_eq!(next_event(&mut events).await, SessionEvent::Disconnected);
    timeout(WAIT, server).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_unreachable_server_goes_back_to_disconnected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = SessionHandle::new(SessionConfig::new(format!("ws://{addr}")));
    let mut state_rx = session.watch_state();
    let mut events = session.subscribe();

    session.connect("alice");
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Connecting);
    assert_eq!(next_event(&mut events).await, SessionEvent::Disconnected);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(!session.send("anyone?"));
}

#[tokio::test]
async fn test_foreign_origin_is_rejected_and_never_registered() {
    let relay = start_relay(ServerConfig::default()).await;
    let (alice, mut alice_events) = join(&relay, "alice").await;
    relay.wait_for_sessions(1).await;

    let config = SessionConfig::new(&relay.url).with_origin("http://evil.example");
    let intruder = SessionHandle::new(config);
    let mut intruder_events = intruder.subscribe();
    intruder.connect("mallory");
    assert_eq!(next_event(&mut intruder_events).await, SessionEvent::Disconnected);

    assert_eq!(relay.state.registry.len().await, 1);
    assert_eq!(relay.state.metrics.snapshot().connections.rejected, 1);

    assert!(alice.send("private"));
    assert_eq!(next_message(&mut alice_events).await.text, "private");
    assert_quiet(&mut intruder_events).await;
}

#[tokio::test]
async fn test_allowed_origin_is_accepted() {
    let relay = start_relay(ServerConfig::default()).await;
    let config = SessionConfig::new(&relay.url).with_origin("http://localhost:5173/");
    let session = SessionHandle::new(config);
    let mut events = session.subscribe();
    session.connect("alice");
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
}

#[tokio::test]
async fn test_foreign_origin_handshake_status() {
    let relay = start_relay(ServerConfig::default()).await;
    let mut request =
        tungstenite::client::IntoClientRequest::into_client_request(format!("{}/ws", relay.url))
            .unwrap();
    request
        .headers_mut()
        .insert("origin", "http://evil.example".parse().unwrap());

    match tokio_tungstenite::connect_async(request).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 403),
        other => panic!("expected HTTP rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_missing_username_rejected_when_required() {
    let mut config = ServerConfig::default();
    config.require_username = true;
    let relay = start_relay(config).await;

    match tokio_tungstenite::connect_async(format!("{}/ws", relay.url)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 400),
        other => panic!("expected HTTP rejection, got {:?}", other.map(|_| ())),
    }

    // A named client still gets in
    let (_alice, _events) = join(&relay, "alice").await;
    relay.wait_for_sessions(1).await;
}

#[tokio::test]
async fn test_anonymous_connection_allowed_by_default() {
    let relay = start_relay(ServerConfig::default()).await;
    let (_ws, _) = tokio_tungstenite::connect_async(format!("{}/ws", relay.url))
        .await
        .unwrap();
    relay.wait_for_sessions(1).await;
    let sessions = relay.state.registry.sessions().await;
    assert_eq!(sessions[0].label(), "anonymous");
}

const MALFORMED: &str = r#"{"event":"chat message","data":{"user":"x"}}"#;

/// Send a malformed envelope, a non-JSON frame, then a valid envelope.
/// Returns the echoed frames and the malformed-frame count.
async fn raw_exchange(config: ServerConfig) -> (Vec<String>, u64) {
    let relay = start_relay(config).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}/ws?username=raw", relay.url))
        .await
        .unwrap();
    relay.wait_for_sessions(1).await;

    ws.send(Message::Text(MALFORMED.into())).await.unwrap();
    ws.send(Message::Text("not json".into())).await.unwrap();
    let valid = r#"{"event":"chat message","data":{"user":"raw","text":"ok"}}"#;
    ws.send(Message::Text(valid.into())).await.unwrap();

    // Collect until the valid message comes back
    let mut received = Vec::new();
    timeout(WAIT, async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let done = text.as_str().contains("\"ok\"");
                received.push(text.as_str().to_string());
                if done {
                    break;
                }
            }
        }
    })
    .await
    .expect("valid frame never echoed");
    (received, relay.state.metrics.snapshot().messages.malformed)
}

#[tokio::test]
async fn test_verbatim_relay_forwards_malformed_envelopes() {
    let (received, malformed) = raw_exchange(ServerConfig::default()).await;
    assert_eq!(received.len(), 2);
    assert_eq!(malformed, 1);
    let first: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(first, serde_json::from_str::<serde_json::Value>(MALFORMED).unwrap());
}

#[tokio::test]
async fn test_strict_relay_drops_malformed_envelopes() {
    let mut config = ServerConfig::default();
    config.relay.strict_envelopes = true;
    let (received, malformed) = raw_exchange(config).await;
    assert_eq!(received.len(), 1);
    assert_eq!(malformed, 2);
    assert!(received[0].contains("\"text\":\"ok\""));
}
