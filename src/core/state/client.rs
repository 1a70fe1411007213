// src/core/state/client.rs

//! Contains state definitions related to subscriber connections.

use crate::core::limiter::OriginKey;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

pub type ClientMap = Arc<DashMap<u64, ClientInfo>>;

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub addr: SocketAddr,
    pub client_id: u64,
    pub origin: OriginKey,
    /// The room of the subscriber's current or most recent session.
    pub room: Option<String>,
    pub created: Instant,
    pub last_request_time: Instant,
}

impl ClientInfo {
    pub fn new(client_id: u64, addr: SocketAddr, origin: OriginKey) -> Self {
        let now = Instant::now();
        Self {
            addr,
            client_id,
            origin,
            room: None,
            created: now,
            last_request_time: now,
        }
    }
}
