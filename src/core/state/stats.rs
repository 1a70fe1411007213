// src/core/state/stats.rs

//! Contains state definitions and logic for server statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide counters that are not tied to a single session.
#[derive(Debug, Default)]
pub struct StatsState {
    /// The total number of subscriber connections accepted since startup.
    total_connections: AtomicU64,
    /// The total number of session-start requests received since startup.
    total_session_requests: AtomicU64,
    /// The total number of session-start requests denied by the limiter.
    total_denials: AtomicU64,
}

impl StatsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn increment_session_requests(&self) {
        self.total_session_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_session_requests(&self) -> u64 {
        self.total_session_requests.load(Ordering::Relaxed)
    }

    pub fn increment_denials(&self) {
        self.total_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_denials(&self) -> u64 {
        self.total_denials.load(Ordering::Relaxed)
    }
}
