// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use crate::core::state::{ClientInfo, ServerState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// Registers a subscriber in the client map for as long as it lives, and
/// removes it again however the connection handler exits.
pub struct ConnectionGuard {
    pub(crate) state: Arc<ServerState>,
    pub(crate) client_id: u64,
    pub(crate) addr: SocketAddr,
    /// The subscriber's slot under `max_clients`.
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    pub(crate) fn new(
        state: Arc<ServerState>,
        info: ClientInfo,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        let client_id = info.client_id;
        let addr = info.addr;
        state.clients.insert(client_id, info);
        state.stats.increment_total_connections();
        metrics::CONNECTED_SUBSCRIBERS.inc();
        metrics::SUBSCRIBERS_ACCEPTED_TOTAL.inc();
        Self {
            state,
            client_id,
            addr,
            _permit: permit,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_SUBSCRIBERS.dec();
        debug!(
            "ConnectionGuard dropping, cleaning up resources for subscriber {}",
            self.addr
        );
        if self.state.clients.remove(&self.client_id).is_none() {
            debug!(
                "Subscriber {} was not in the client map upon cleanup.",
                self.addr
            );
        }
    }
}
