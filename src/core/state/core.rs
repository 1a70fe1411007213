// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::client::ClientMap;
use super::stats::StatsState;
use crate::config::Config;
use crate::core::gifts::GiftDispatcher;
use crate::core::limiter::RateLimiter;
use crate::core::registry::SessionRegistry;
use crate::core::session::{SessionContext, SessionSupervisor};
use crate::core::upstream::{UpstreamConnector, WsUpstreamConnector};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, broadcast};
use tracing::info;

/// Capacity of the statistics broadcast. Lagging receivers skip to the newest value.
const STATISTICS_CHANNEL_CAPACITY: usize = 16;

/// The central struct holding all shared, server-wide state.
///
/// The limiter and the registry are the only mutable state shared between
/// sessions; both are owned here and handed out by reference.
#[derive(Debug)]
pub struct ServerState {
    /// The immutable runtime configuration.
    pub config: Arc<Config>,
    /// A map of all connected subscribers, keyed by a unique client id.
    pub clients: ClientMap,
    /// Admission control for session starts.
    pub limiter: Arc<RateLimiter>,
    /// The number of live upstream sessions.
    pub registry: Arc<SessionRegistry>,
    /// The collaborators handed to every new session.
    pub sessions: SessionContext,
    /// Publishes the registry count to every connected subscriber.
    pub statistics_tx: broadcast::Sender<usize>,
    /// Bounds the number of concurrently connected subscribers.
    pub client_permits: Arc<Semaphore>,
    pub stats: StatsState,
    next_client_id: AtomicU64,
}

impl ServerState {
    /// Initializes the server state with the WebSocket bridge connector.
    pub fn initialize(config: Config) -> Arc<Self> {
        let connector = Arc::new(WsUpstreamConnector::new(&config.upstream));
        info!("Upstream bridge template: {}", config.upstream.url);
        Self::with_connector(config, connector)
    }

    /// Initializes the server state around an arbitrary upstream connector.
    pub fn with_connector(config: Config, connector: Arc<dyn UpstreamConnector>) -> Arc<Self> {
        let registry = SessionRegistry::new();
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let gifts = Arc::new(GiftDispatcher::from_config(&config.gifts));
        let sessions = SessionContext {
            connector,
            registry: registry.clone(),
            gifts,
            config: config.session.clone(),
            session_id: config.session_id.clone(),
        };
        let (statistics_tx, _) = broadcast::channel(STATISTICS_CHANNEL_CAPACITY);
        let client_permits = Arc::new(Semaphore::new(config.max_clients));

        Arc::new(Self {
            config: Arc::new(config),
            clients: Arc::new(DashMap::new()),
            limiter,
            registry,
            sessions,
            statistics_tx,
            client_permits,
            stats: StatsState::new(),
            next_client_id: AtomicU64::new(1),
        })
    }

    /// Allocates a process-unique client id.
    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates a fresh, idle session for a subscriber.
    pub fn new_session(&self, client_id: u64) -> SessionSupervisor {
        SessionSupervisor::new(client_id, self.sessions.clone())
    }
}
