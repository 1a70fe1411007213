// src/core/registry.rs

//! The process-wide count of live upstream sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::error;

/// Counts sessions that have reached `Active` and not yet reached `Closed`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    count: AtomicUsize,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
        crate::core::metrics::ACTIVE_SESSIONS.inc();
    }

    /// Decrements the count. Never wraps below zero; an unbalanced call is
    /// logged and ignored.
    pub fn decrement(&self) {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(_) => crate::core::metrics::ACTIVE_SESSIONS.dec(),
            Err(_) => error!("SessionRegistry decremented below zero; ignoring."),
        }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Increments the count and returns a guard that decrements it exactly once on drop.
    pub fn enter(self: &Arc<Self>) -> RegistryGuard {
        self.increment();
        RegistryGuard {
            registry: Arc::clone(self),
        }
    }
}

/// Ties one increment to exactly one later decrement.
#[derive(Debug)]
pub struct RegistryGuard {
    registry: Arc<SessionRegistry>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.decrement();
    }
}
