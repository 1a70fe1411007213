// tests/integration/upstream_bridge_test.rs

//! Integration tests for the WebSocket upstream bridge client
//! Tests: handshake, frame translation, rejection, close handling, full session

use super::test_helpers::{WAIT, recv};
use futures::{SinkExt, StreamExt};
use liverelay::config::{SessionConfig, UpstreamConfig};
use liverelay::core::gifts::{GiftDispatcher, GiftHandler};
use liverelay::core::limiter::{Admission, OriginKey, RateLimiter};
use liverelay::core::registry::SessionRegistry;
use liverelay::core::session::{OutboundEvent, SessionContext, SessionSupervisor};
use liverelay::core::upstream::{
    ConnectOptions, EventKind, UpstreamConnector, UpstreamError, UpstreamEvent,
    WsUpstreamConnector,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// What the fake bridge does after receiving the `connect` frame.
enum Script {
    /// Accept the room, then send these frames, then close.
    Accept(Vec<Value>),
    Reject(&'static str),
}

/// Spawns a one-shot bridge. Resolves the `connect` frame's data through `hello_tx`.
async fn spawn_bridge(script: Script) -> (SocketAddr, oneshot::Receiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (hello_tx, hello_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();

        let hello = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(text.as_str()).unwrap(),
            other => panic!("expected connect frame, got {other:?}"),
        };
        assert_eq!(hello["event"], "connect");
        let _ = hello_tx.send(hello["data"].clone());

        let frames = match script {
            Script::Accept(frames) => {
                let mut all = vec![json!({ "event": "connected", "data": { "roomId": "7001" } })];
                all.extend(frames);
                all
            }
            Script::Reject(reason) => vec![json!({ "event": "error", "data": reason })],
        };
        for frame in frames {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }
        let _ = ws.close(None).await;
    });

    (addr, hello_rx)
}

fn connector(addr: SocketAddr) -> WsUpstreamConnector {
    WsUpstreamConnector::new(&UpstreamConfig {
        url: format!("ws://{addr}/rooms/{{room}}"),
        event_buffer: 32,
    })
}

fn options(value: Value) -> ConnectOptions {
    ConnectOptions::sanitize(value, &[], None)
}

async fn next_event(rx: &mut mpsc::Receiver<UpstreamEvent>) -> UpstreamEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for upstream event")
        .expect("upstream event channel closed")
}

#[tokio::test]
async fn test_handshake_and_frame_translation() {
    let (addr, hello) = spawn_bridge(Script::Accept(vec![
        json!({ "event": "chat", "data": { "comment": "hello" } }),
        json!({ "event": "rankUpdate", "data": {} }),
        json!({ "event": "gift", "data": { "giftName": "Rose" } }),
        json!({ "event": "streamEnd", "data": null }),
    ]))
    .await;

    let mut client = connector(addr)
        .create("alice", options(json!({ "enableExtendedGiftInfo": true })))
        .unwrap();
    let state = client.connect().await.unwrap();
    assert_eq!(state.0["roomId"], "7001");
    assert_eq!(hello.await.unwrap(), json!({ "enableExtendedGiftInfo": true }));

    let mut events = client.take_events().unwrap();
    assert!(client.take_events().is_none());

    match next_event(&mut events).await {
        UpstreamEvent::Message(e) => {
            assert_eq!(e.kind, EventKind::Chat);
            assert_eq!(e.payload["comment"], "hello");
        }
        other => panic!("expected chat, got {other:?}"),
    }
    // `rankUpdate` is not in the vocabulary and is skipped.
    match next_event(&mut events).await {
        UpstreamEvent::Message(e) => assert_eq!(e.kind, EventKind::Gift),
        other => panic!("expected gift, got {other:?}"),
    }
    assert_eq!(next_event(&mut events).await, UpstreamEvent::StreamEnd);
    client.disconnect().await;
    client.disconnect().await;
}

#[tokio::test]
async fn test_rejection_surfaces_reason() {
    let (addr, _hello) = spawn_bridge(Script::Reject("LIVE has ended")).await;
    let mut client = connector(addr).create("alice", options(json!({}))).unwrap();
    assert_eq!(
        client.connect().await.unwrap_err(),
        UpstreamError::Rejected("LIVE has ended".into())
    );
    assert!(client.take_events().is_none());
}

#[tokio::test]
async fn test_close_becomes_disconnected() {
    let (addr, _hello) = spawn_bridge(Script::Accept(vec![])).await;
    let mut client = connector(addr).create("alice", options(json!({}))).unwrap();
    client.connect().await.unwrap();
    let mut events = client.take_events().unwrap();
    assert_eq!(
        next_event(&mut events).await,
        UpstreamEvent::Disconnected("upstream connection closed".into())
    );
}

#[tokio::test]
async fn test_unreachable_bridge_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client = connector(addr).create("alice", options(json!({}))).unwrap();
    assert!(matches!(
        client.connect().await,
        Err(UpstreamError::Transport(_))
    ));
}

#[tokio::test]
async fn test_full_session_over_bridge() {
    let (addr, hello) = spawn_bridge(Script::Accept(vec![
        json!({ "event": "gift", "data": { "giftName": "Bravo" } }),
        json!({ "event": "streamEnd" }),
    ]))
    .await;

    let bravo = Arc::new(AtomicUsize::new(0));
    let mut gifts = GiftDispatcher::new();
    let counter = bravo.clone();
    let handler: GiftHandler = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    gifts.register("Bravo", handler);

    let registry = SessionRegistry::new();
    let ctx = SessionContext {
        connector: Arc::new(connector(addr)),
        registry: registry.clone(),
        gifts: Arc::new(gifts),
        config: SessionConfig::default(),
        session_id: Some("sid-from-env".into()),
    };
    let limiter = RateLimiter::new(Default::default());
    let permit = match limiter.admit(&OriginKey::from("198.51.100.4")) {
        Admission::Allowed(permit) => permit,
        Admission::Denied(reason) => panic!("unexpected denial: {reason:?}"),
    };

    let mut session = SessionSupervisor::new(1, ctx);
    let (tx, mut rx) = mpsc::channel(16);
    session
        .start(
            "alice",
            json!({ "requestOptions": { "proxy": "x" } }),
            permit,
            tx,
        )
        .unwrap();

    assert!(matches!(recv(&mut rx).await, Some(OutboundEvent::Connected(_))));
    match recv(&mut rx).await {
        Some(OutboundEvent::Event(e)) => assert_eq!(e.payload["giftName"], "Bravo"),
        other => panic!("expected gift, got {other:?}"),
    }
    assert_eq!(recv(&mut rx).await, Some(OutboundEvent::StreamEnd));
    session.closed().await;

    assert_eq!(hello.await.unwrap(), json!({ "sessionId": "sid-from-env" }));
    assert_eq!(bravo.load(Ordering::SeqCst), 1);
    assert_eq!(registry.current(), 0);
    assert_eq!(limiter.total_active(), 0);
}
