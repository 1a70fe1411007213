// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use liverelay::config::Config;
use liverelay::core::gifts::GiftDispatcher;
use liverelay::core::limiter::{Admission, AdmissionPermit, OriginKey};
use liverelay::core::session::{OutboundEvent, SessionContext, SessionSupervisor};
use liverelay::core::state::ServerState;
use liverelay::core::tasks::statistics::StatisticsBroadcasterTask;
use liverelay::core::upstream::{
    ConnectOptions, RoomState, UpstreamClient, UpstreamConnector, UpstreamError, UpstreamEvent,
};
use liverelay::server::router;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const WAIT: Duration = Duration::from_secs(5);

/// How a scripted upstream room answers `connect`.
#[derive(Clone)]
pub enum ConnectBehaviour {
    Succeed(Value),
    Reject(String),
    /// Succeeds once the gate is notified.
    Gated(Arc<Notify>),
}

/// What the test can observe about (and push into) one created upstream client.
pub struct ClientHandle {
    pub room: String,
    pub options: ConnectOptions,
    pub events_tx: mpsc::Sender<UpstreamEvent>,
    /// Number of times `connect` was called.
    pub connect_calls: AtomicUsize,
    pub connected: AtomicBool,
    pub disconnects: AtomicUsize,
}

impl ClientHandle {
    pub async fn push(&self, event: UpstreamEvent) {
        self.events_tx
            .send(event)
            .await
            .expect("session stopped reading upstream events");
    }
}

struct ScriptedClient {
    handle: Arc<ClientHandle>,
    behaviour: ConnectBehaviour,
    events_rx: Option<mpsc::Receiver<UpstreamEvent>>,
}

#[async_trait]
impl UpstreamClient for ScriptedClient {
    async fn connect(&mut self) -> Result<RoomState, UpstreamError> {
        self.handle.connect_calls.fetch_add(1, Ordering::SeqCst);
        let state = match &self.behaviour {
            ConnectBehaviour::Succeed(state) => state.clone(),
            ConnectBehaviour::Reject(reason) => return Err(UpstreamError::Rejected(reason.clone())),
            ConnectBehaviour::Gated(gate) => {
                gate.notified().await;
                json!({ "roomId": "gated" })
            }
        };
        self.handle.connected.store(true, Ordering::SeqCst);
        Ok(RoomState(state))
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<UpstreamEvent>> {
        if self.handle.connected.load(Ordering::SeqCst) {
            self.events_rx.take()
        } else {
            None
        }
    }

    async fn disconnect(&mut self) {
        self.handle.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// An in-memory upstream whose rooms behave as the test scripts them.
#[derive(Default)]
pub struct ScriptedConnector {
    behaviours: Mutex<HashMap<String, ConnectBehaviour>>,
    clients: Mutex<Vec<Arc<ClientHandle>>>,
}

impl ScriptedConnector {
    pub fn script(&self, room: &str, behaviour: ConnectBehaviour) {
        self.behaviours.lock().insert(room.to_string(), behaviour);
    }

    pub fn created(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn client(&self, index: usize) -> Arc<ClientHandle> {
        self.clients.lock()[index].clone()
    }

    pub fn last_client(&self) -> Arc<ClientHandle> {
        self.clients
            .lock()
            .last()
            .cloned()
            .expect("no upstream client was created")
    }
}

impl UpstreamConnector for ScriptedConnector {
    fn create(
        &self,
        room: &str,
        options: ConnectOptions,
    ) -> Result<Box<dyn UpstreamClient>, UpstreamError> {
        if room.trim().is_empty() {
            return Err(UpstreamError::InvalidRoom("room id cannot be empty".into()));
        }
        let behaviour = self
            .behaviours
            .lock()
            .get(room)
            .cloned()
            .unwrap_or_else(|| ConnectBehaviour::Succeed(json!({ "roomId": room })));
        let (events_tx, events_rx) = mpsc::channel(64);
        let handle = Arc::new(ClientHandle {
            room: room.to_string(),
            options,
            events_tx,
            connect_calls: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
        });
        self.clients.lock().push(handle.clone());
        Ok(Box::new(ScriptedClient {
            handle,
            behaviour,
            events_rx: Some(events_rx),
        }))
    }
}

/// TestContext provides a complete relay environment around a scripted upstream.
pub struct TestContext {
    pub state: Arc<ServerState>,
    pub connector: Arc<ScriptedConnector>,
    pub sessions: SessionContext,
    next_session_id: AtomicUsize,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let connector = Arc::new(ScriptedConnector::default());
        let state = ServerState::with_connector(config, connector.clone());
        let sessions = state.sessions.clone();
        Self {
            state,
            connector,
            sessions,
            next_session_id: AtomicUsize::new(1),
        }
    }

    /// Uses `gifts` for sessions created through `session()`.
    pub fn with_gifts(mut self, gifts: GiftDispatcher) -> Self {
        self.sessions.gifts = Arc::new(gifts);
        self
    }

    pub fn session(&self) -> SessionSupervisor {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed) as u64;
        SessionSupervisor::new(id, self.sessions.clone())
    }

    pub fn admit(&self, origin: &str) -> AdmissionPermit {
        match self.state.limiter.admit(&OriginKey::from(origin)) {
            Admission::Allowed(permit) => permit,
            Admission::Denied(reason) => panic!("unexpected denial: {reason:?}"),
        }
    }

    /// Starts a session for `room` and returns it with its outbound channel.
    pub fn start(
        &self,
        room: &str,
        options: Value,
    ) -> (SessionSupervisor, mpsc::Receiver<OutboundEvent>) {
        let mut session = self.session();
        let (tx, rx) = mpsc::channel(self.state.config.session.outbound_buffer);
        session
            .start(room, options, self.admit("127.0.0.1"), tx)
            .expect("session failed to start");
        (session, rx)
    }

    /// Serves the gateway on an ephemeral loopback port, with the statistics broadcaster.
    pub async fn serve(&self) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);

        let app = router(self.state.clone(), shutdown_tx.clone())
            .into_make_service_with_connect_info::<SocketAddr>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let stats = StatisticsBroadcasterTask::new(self.state.clone());
        let stats_shutdown = shutdown_tx.subscribe();
        let broadcaster = tokio::spawn(async move { stats.run(stats_shutdown).await });

        TestServer {
            addr,
            shutdown_tx,
            tasks: vec![server, broadcaster],
        }
    }
}

/// Defaults with a quiet statistics interval, so tests see few `statistic` frames.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.statistics_interval = Duration::from_secs(60);
    config.session.connect_timeout = Duration::from_secs(2);
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A subscriber speaking the gateway's JSON frame protocol.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(server: &TestServer) -> Self {
        let (stream, _) = connect_async(server.url()).await.expect("ws connect failed");
        Self { stream }
    }

    /// Connects with an `X-Forwarded-For` header, as a local reverse proxy would.
    pub async fn connect_forwarded(server: &TestServer, forwarded_for: &str) -> Self {
        let mut request = server.url().into_client_request().unwrap();
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse().unwrap());
        let (stream, _) = connect_async(request).await.expect("ws connect failed");
        Self { stream }
    }

    pub async fn send(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data });
        self.stream
            .send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn set_unique_id(&mut self, room: &str, options: Value) {
        self.send("setUniqueId", json!({ "uniqueId": room, "options": options }))
            .await;
    }

    /// The next JSON frame, or `None` once the server closes the socket.
    pub async fn next_frame(&mut self) -> Option<Value> {
        loop {
            let message = tokio::time::timeout(WAIT, self.stream.next())
                .await
                .expect("timed out waiting for a frame")?;
            match message.ok()? {
                Message::Text(text) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// The next frame that is not a `statistic` tick.
    pub async fn next_relay_frame(&mut self) -> Value {
        loop {
            let frame = self.next_frame().await.expect("connection closed");
            if frame["event"] != "statistic" {
                return frame;
            }
        }
    }

    /// Skips frames until one named `event` arrives and returns its data.
    pub async fn expect_event(&mut self, event: &str) -> Value {
        loop {
            let frame = self.next_frame().await.expect("connection closed");
            if frame["event"] == event {
                return frame["data"].clone();
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Receives the next outbound event or fails the test after `WAIT`.
pub async fn recv(rx: &mut mpsc::Receiver<OutboundEvent>) -> Option<OutboundEvent> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an outbound event")
}

/// Polls `condition` until it holds or `WAIT` elapses.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn init_tracing() {
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
