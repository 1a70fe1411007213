// src/connection/session.rs

//! Defines the state associated with a single subscriber.

use crate::core::session::{OutboundEvent, SessionSupervisor};
use tokio::sync::mpsc;

/// Holds the subscriber's current session and the channel its events arrive on.
#[derive(Debug, Default)]
pub struct SubscriberState {
    /// The current or most recent session. Replaced only once it is `Closed`.
    pub session: Option<SessionSupervisor>,
    /// Events from `session`, until its driver finishes.
    pub events: Option<mpsc::Receiver<OutboundEvent>>,
}

impl SubscriberState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a session is in any phase other than `Closed`.
    pub fn has_live_session(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Waits for the next outbound event. Pends forever when no session is attached.
    pub async fn next_event(&mut self) -> Option<OutboundEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Cancels the current session without waiting for its teardown.
    pub fn cancel(&self) {
        if let Some(session) = &self.session {
            session.cancel();
        }
    }
}
