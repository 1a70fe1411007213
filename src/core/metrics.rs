// src/core/metrics.rs

//! Defines and registers Prometheus metrics for relay monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Gauges ---
    /// The number of subscribers currently connected to the gateway.
    pub static ref CONNECTED_SUBSCRIBERS: Gauge =
        register_gauge!("liverelay_connected_subscribers", "Number of currently connected subscribers.").unwrap();
    /// The number of sessions that reached Active and have not yet closed.
    pub static ref ACTIVE_SESSIONS: Gauge =
        register_gauge!("liverelay_active_sessions", "Number of live upstream sessions.").unwrap();

    // --- Counters ---
    /// The total number of subscriber connections accepted since startup.
    pub static ref SUBSCRIBERS_ACCEPTED_TOTAL: Counter =
        register_counter!("liverelay_subscribers_accepted_total", "Total number of subscriber connections accepted.").unwrap();
    /// The total number of sessions that were admitted and started.
    pub static ref SESSIONS_STARTED_TOTAL: Counter =
        register_counter!("liverelay_sessions_started_total", "Total number of sessions started.").unwrap();
    /// Admission denials, labeled by reason.
    pub static ref ADMISSIONS_DENIED_TOTAL: CounterVec =
        register_counter_vec!("liverelay_admissions_denied_total", "Total number of denied session starts, labeled by reason.", &["reason"]).unwrap();
    /// Events forwarded to subscribers, labeled by event name.
    pub static ref RELAYED_EVENTS_TOTAL: CounterVec =
        register_counter_vec!("liverelay_relayed_events_total", "Total number of events relayed, labeled by event.", &["event"]).unwrap();
    /// Events dropped because a subscriber's outbound buffer was full.
    pub static ref DROPPED_EVENTS_TOTAL: Counter =
        register_counter!("liverelay_dropped_events_total", "Total number of events dropped for slow subscribers.").unwrap();

    // --- Gifts ---
    /// Gift dispatches, labeled by outcome (`handled` / `unhandled`).
    pub static ref GIFTS_DISPATCHED_TOTAL: CounterVec =
        register_counter_vec!("liverelay_gifts_dispatched_total", "Total number of gift dispatches, labeled by outcome.", &["outcome"]).unwrap();
    /// Builtin reactions fired, labeled by gift name.
    pub static ref GIFT_REACTIONS_TOTAL: CounterVec =
        register_counter_vec!("liverelay_gift_reactions_total", "Total number of builtin gift reactions, labeled by gift.", &["gift"]).unwrap();
    /// Gift handlers that returned an error or panicked.
    pub static ref GIFT_HANDLER_FAULTS_TOTAL: Counter =
        register_counter!("liverelay_gift_handler_faults_total", "Total number of gift handler faults.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
