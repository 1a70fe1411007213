// src/core/limiter/mod.rs

//! Per-origin admission control for new sessions.
//!
//! Every session-start attempt calls `RateLimiter::admit` exactly once. An
//! admitted attempt reserves an active-session slot for its origin and is
//! recorded in the origin's sliding attempt window immediately, so retry storms
//! are throttled even when each attempt fails fast upstream. The reserved slot
//! lives in the returned `AdmissionPermit` and is released when the permit is
//! dropped, i.e. when the owning session reaches `Closed`.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

pub mod origin;
pub mod purger;

pub use origin::OriginKey;

const OVERUSE_MESSAGE: &str = "You have opened too many connections or made too many connection requests. Please reduce the number of connections/requests or host your own server instance. The connections are limited to avoid that the server IP gets blocked by the upstream provider.";

const CAPACITY_MESSAGE: &str = "The server has reached its maximum number of live sessions. Please try again later or host your own server instance.";

/// Why an attempt was not admitted. `Display` yields the text shown to the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    TooManyConnections,
    TooManyAttempts,
    ServerAtCapacity,
}

impl DenialReason {
    /// A short, stable label for metrics and logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DenialReason::TooManyConnections => "too_many_connections",
            DenialReason::TooManyAttempts => "too_many_attempts",
            DenialReason::ServerAtCapacity => "server_at_capacity",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::TooManyConnections | DenialReason::TooManyAttempts => {
                f.write_str(OVERUSE_MESSAGE)
            }
            DenialReason::ServerAtCapacity => f.write_str(CAPACITY_MESSAGE),
        }
    }
}

/// The outcome of an admission check.
#[derive(Debug)]
pub enum Admission {
    Allowed(AdmissionPermit),
    Denied(DenialReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed(_))
    }
}

/// Accounting for one origin.
#[derive(Debug, Default)]
pub struct RateRecord {
    /// Admission times inside the trailing window, oldest first.
    attempts: VecDeque<Instant>,
    /// Sessions holding a permit for this origin.
    active: usize,
}

impl RateRecord {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.attempts.front() {
            if now.duration_since(*oldest) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn attempts_in_window(&self) -> usize {
        self.attempts.len()
    }

    fn is_idle(&self) -> bool {
        self.active == 0 && self.attempts.is_empty()
    }
}

/// Process-wide admission state, shared by all gateway connections.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitConfig,
    records: DashMap<OriginKey, RateRecord>,
    global_active: AtomicUsize,
}

impl RateLimiter {
    pub fn new(policy: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            policy,
            records: DashMap::new(),
            global_active: AtomicUsize::new(0),
        })
    }

    pub fn policy(&self) -> &RateLimitConfig {
        &self.policy
    }

    /// Decides whether `origin` may start a new session.
    ///
    /// The global slot is reserved with a compare-and-swap and the per-origin
    /// checks run under the origin's map entry lock, so concurrent admits at a
    /// limit boundary can never both succeed.
    pub fn admit(self: &Arc<Self>, origin: &OriginKey) -> Admission {
        let enforce = self.policy.enabled;

        if enforce && self.policy.max_global_sessions > 0 {
            let max = self.policy.max_global_sessions;
            if self
                .global_active
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max).then_some(n + 1)
                })
                .is_err()
            {
                return self.deny(origin, DenialReason::ServerAtCapacity);
            }
        } else {
            self.global_active.fetch_add(1, Ordering::AcqRel);
        }

        let denial = {
            let mut record = self.records.entry(origin.clone()).or_default();
            if enforce {
                record.prune(Instant::now(), self.policy.window);
                if record.active >= self.policy.max_concurrent_sessions {
                    Some(DenialReason::TooManyConnections)
                } else if record.attempts.len() >= self.policy.max_attempts_per_window {
                    Some(DenialReason::TooManyAttempts)
                } else {
                    record.attempts.push_back(Instant::now());
                    record.active += 1;
                    None
                }
            } else {
                record.active += 1;
                None
            }
        };

        match denial {
            Some(reason) => {
                self.release_global();
                self.deny(origin, reason)
            }
            None => Admission::Allowed(AdmissionPermit {
                limiter: Arc::clone(self),
                origin: origin.clone(),
            }),
        }
    }

    fn deny(&self, origin: &OriginKey, reason: DenialReason) -> Admission {
        info!(
            "LIMITER: denied session start for {} ({})",
            origin,
            reason.as_label()
        );
        crate::core::metrics::ADMISSIONS_DENIED_TOTAL
            .with_label_values(&[reason.as_label()])
            .inc();
        Admission::Denied(reason)
    }

    fn release(&self, origin: &OriginKey) {
        if let Some(mut record) = self.records.get_mut(origin) {
            record.active = record.active.saturating_sub(1);
        }
        self.release_global();
    }

    fn release_global(&self) {
        let _ = self
            .global_active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Number of sessions currently holding a permit for `origin`.
    pub fn active_sessions(&self, origin: &OriginKey) -> usize {
        self.records.get(origin).map_or(0, |r| r.active())
    }

    /// Number of admitted attempts for `origin` inside the trailing window.
    pub fn attempts_in_window(&self, origin: &OriginKey) -> usize {
        self.records.get_mut(origin).map_or(0, |mut r| {
            r.prune(Instant::now(), self.policy.window);
            r.attempts_in_window()
        })
    }

    /// Number of permits held across all origins.
    pub fn total_active(&self) -> usize {
        self.global_active.load(Ordering::Acquire)
    }

    pub fn tracked_origins(&self) -> usize {
        self.records.len()
    }

    /// Drops records whose window has fully expired and that hold no permits.
    /// Such records are indistinguishable from absent ones. Returns the number removed.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let window = self.policy.window;
        let before = self.records.len();
        self.records.retain(|_, record| {
            record.prune(now, window);
            !record.is_idle()
        });
        before.saturating_sub(self.records.len())
    }
}

/// An admitted attempt's reserved active-session slot.
pub struct AdmissionPermit {
    limiter: Arc<RateLimiter>,
    origin: OriginKey,
}

impl AdmissionPermit {
    pub fn origin(&self) -> &OriginKey {
        &self.origin
    }
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("origin", &self.origin)
            .finish()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.limiter.release(&self.origin);
    }
}
