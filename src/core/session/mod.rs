// src/core/session/mod.rs

//! The per-subscriber session supervisor.
//!
//! A `SessionSupervisor` owns at most one upstream client for its whole life.
//! `start` moves it from `Idle` to `Connecting` and hands the client to a
//! spawned driver task, which performs the connect handshake, runs the relay
//! loop while `Active`, and tears everything down on its way to `Closed`.
//! `Closed` is terminal: a new start request needs a new supervisor.

use crate::config::SessionConfig;
use crate::core::errors::RelayError;
use crate::core::gifts::GiftDispatcher;
use crate::core::limiter::AdmissionPermit;
use crate::core::metrics;
use crate::core::registry::SessionRegistry;
use crate::core::upstream::{ConnectOptions, RelayedEvent, RoomState, UpstreamConnector};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

mod driver;

use driver::SessionDriver;

/// The lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Active,
    Disconnecting,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Active => "active",
            SessionPhase::Disconnecting => "disconnecting",
            SessionPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Everything a session sends towards its subscriber, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Emitted once, on entering `Active`.
    Connected(RoomState),
    /// Emitted at most once, when the connect fails or the upstream drops.
    Disconnected(String),
    /// Emitted at most once, when the broadcast ends.
    StreamEnd,
    /// A pass-through event from the fixed vocabulary.
    Event(RelayedEvent),
}

/// The shared collaborators every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub connector: Arc<dyn UpstreamConnector>,
    pub registry: Arc<SessionRegistry>,
    pub gifts: Arc<GiftDispatcher>,
    pub config: SessionConfig,
    /// Injected into every start request as `sessionId`.
    pub session_id: Option<String>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("gifts", &self.gifts)
            .field("config", &self.config)
            .field("session_id", &self.session_id.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

pub struct SessionSupervisor {
    id: u64,
    ctx: SessionContext,
    room: Option<String>,
    phase: Arc<watch::Sender<SessionPhase>>,
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl SessionSupervisor {
    pub fn new(id: u64, ctx: SessionContext) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Self {
            id,
            ctx,
            room: None,
            phase: Arc::new(phase),
            cancel: CancellationToken::new(),
            driver: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The room this session was started for, once `start` has been called.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == SessionPhase::Closed
    }

    /// A receiver that observes every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Starts the upstream session for `room`.
    ///
    /// `options` is sanitised before it reaches the connector. The admission
    /// `permit` is held until the session reaches `Closed`. A construction
    /// failure is returned here and leaves the supervisor `Closed`; connect
    /// failures arrive later as `OutboundEvent::Disconnected`.
    pub fn start(
        &mut self,
        room: &str,
        options: Value,
        permit: AdmissionPermit,
        outbound: mpsc::Sender<OutboundEvent>,
    ) -> Result<(), RelayError> {
        if self.phase() != SessionPhase::Idle {
            debug!("Session {}: start rejected in phase {}.", self.id, self.phase());
            return Err(RelayError::AlreadyStarted);
        }

        let options = ConnectOptions::sanitize(
            options,
            &self.ctx.config.stripped_option_keys,
            self.ctx.session_id.as_deref(),
        );

        let client = match self.ctx.connector.create(room, options) {
            Ok(client) => client,
            Err(e) => {
                info!("Session {}: could not create upstream client for '{}': {}", self.id, room, e);
                self.phase.send_replace(SessionPhase::Closed);
                return Err(e.into());
            }
        };

        self.room = Some(room.to_string());
        self.phase.send_replace(SessionPhase::Connecting);
        metrics::SESSIONS_STARTED_TOTAL.inc();
        info!(
            "Session {}: connecting to room '{}' for {}.",
            self.id,
            room,
            permit.origin()
        );

        let driver = SessionDriver {
            id: self.id,
            room: room.to_string(),
            ctx: self.ctx.clone(),
            phase: self.phase.clone(),
            cancel: self.cancel.clone(),
            outbound,
        };
        self.driver = Some(tokio::spawn(driver.run(client, permit)));
        Ok(())
    }

    /// Requests teardown. Returns immediately; the driver finishes the
    /// teardown in the background. A session that was never started closes at once.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if self.driver.is_none() {
            self.phase.send_replace(SessionPhase::Closed);
        }
    }

    /// Waits until the session reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|p| *p == SessionPhase::Closed).await;
    }

    /// Cancels the session and waits for the driver to finish its teardown.
    pub async fn shutdown(&mut self) {
        self.cancel();
        if let Some(driver) = self.driver.take()
            && let Err(e) = driver.await
        {
            if e.is_panic() {
                error!("Session {}: driver panicked: {:?}", self.id, e);
            }
            self.phase.send_replace(SessionPhase::Closed);
        }
    }
}

impl fmt::Debug for SessionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSupervisor")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        // The detached driver observes the token and tears the upstream down.
        self.cancel.cancel();
    }
}
