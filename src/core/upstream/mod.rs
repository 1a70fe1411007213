// src/core/upstream/mod.rs

//! The boundary to the upstream live-broadcast provider.
//!
//! The relay never speaks the provider's protocol itself. It talks to an
//! `UpstreamClient` that offers `connect`, `disconnect` and a typed event
//! stream, created per session by an `UpstreamConnector`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use strum_macros::{AsRefStr, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod options;
pub mod websocket;

pub use options::ConnectOptions;
pub use websocket::WsUpstreamConnector;

/// The fixed vocabulary of pass-through events relayed to subscribers.
/// The string form of each variant is the event name used on both wires.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EventKind {
    RoomUser,
    Member,
    Chat,
    Gift,
    Social,
    Like,
    QuestionNew,
    LinkMicBattle,
    LinkMicArmies,
    LiveIntro,
    Emote,
    Envelope,
    Subscribe,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// A pass-through event with its opaque upstream payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedEvent {
    pub kind: EventKind,
    pub payload: Value,
}

impl RelayedEvent {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self { kind, payload }
    }
}

/// Room metadata reported by the upstream provider once connected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RoomState(pub Value);

/// Everything an upstream client can emit after a successful connect.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    Message(RelayedEvent),
    /// The broadcast ended. Terminal.
    StreamEnd,
    /// The upstream transport dropped or reported an unrecoverable error. Terminal.
    Disconnected(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("invalid room id: {0}")]
    InvalidRoom(String),

    #[error("invalid upstream endpoint: {0}")]
    InvalidEndpoint(String),

    /// The provider refused the connection (e.g. room not found, not live).
    #[error("{0}")]
    Rejected(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream protocol error: {0}")]
    Protocol(String),

    #[error("Connection timed out")]
    Timeout,
}

/// A single upstream session, owned exclusively by one `SessionSupervisor`.
#[async_trait]
pub trait UpstreamClient: Send {
    /// Performs the connection handshake and returns the room state.
    async fn connect(&mut self) -> Result<RoomState, UpstreamError>;

    /// Hands out the event stream. Returns `Some` at most once, after a
    /// successful `connect`.
    fn take_events(&mut self) -> Option<mpsc::Receiver<UpstreamEvent>>;

    /// Releases all upstream resources. Must be safe to call more than once.
    async fn disconnect(&mut self);
}

/// Creates upstream clients. Construction failures are reported synchronously.
pub trait UpstreamConnector: Send + Sync {
    fn create(
        &self,
        room: &str,
        options: ConnectOptions,
    ) -> Result<Box<dyn UpstreamClient>, UpstreamError>;
}
