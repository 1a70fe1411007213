// src/core/session/driver.rs

//! The task that drives one session from `Connecting` to `Closed`.

use super::{OutboundEvent, SessionContext, SessionPhase};
use crate::core::errors::RelayError;
use crate::core::gifts::GiftEvent;
use crate::core::limiter::AdmissionPermit;
use crate::core::metrics;
use crate::core::upstream::{RelayedEvent, RoomState, UpstreamClient, UpstreamEvent};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the connect phase ended.
enum ConnectOutcome {
    Connected(RoomState),
    Failed(String),
    Cancelled,
}

/// Why the relay loop stopped.
enum Teardown {
    StreamEnd,
    Disconnected(String),
    Cancelled,
}

pub(super) struct SessionDriver {
    pub(super) id: u64,
    pub(super) room: String,
    pub(super) ctx: SessionContext,
    pub(super) phase: Arc<watch::Sender<SessionPhase>>,
    pub(super) cancel: CancellationToken,
    pub(super) outbound: mpsc::Sender<OutboundEvent>,
}

impl SessionDriver {
    pub(super) async fn run(self, mut client: Box<dyn UpstreamClient>, permit: AdmissionPermit) {
        match self.connect(client.as_mut()).await {
            ConnectOutcome::Connected(state) => {
                // Counted from here until the guard drops, just before `Closed`.
                let registry_guard = self.ctx.registry.enter();
                self.set_phase(SessionPhase::Active);
                info!("Session {}: connected to room '{}'.", self.id, self.room);
                self.emit(OutboundEvent::Connected(state)).await;

                let teardown = match client.take_events() {
                    Some(events) => self.relay(events).await,
                    None => Teardown::Disconnected("upstream event stream unavailable".into()),
                };

                self.set_phase(SessionPhase::Disconnecting);
                match teardown {
                    Teardown::StreamEnd => {
                        info!("Session {}: stream ended for room '{}'.", self.id, self.room);
                        self.emit(OutboundEvent::StreamEnd).await;
                    }
                    Teardown::Disconnected(reason) => {
                        info!("Session {}: upstream disconnected: {}", self.id, reason);
                        self.emit(OutboundEvent::Disconnected(reason)).await;
                    }
                    Teardown::Cancelled => {
                        debug!("Session {}: cancelled by subscriber.", self.id);
                    }
                }
                client.disconnect().await;
                drop(registry_guard);
            }
            ConnectOutcome::Failed(reason) => {
                info!(
                    "Session {}: failed to connect to room '{}': {}",
                    self.id, self.room, reason
                );
                client.disconnect().await;
                self.emit(OutboundEvent::Disconnected(reason)).await;
            }
            ConnectOutcome::Cancelled => {
                client.disconnect().await;
            }
        }

        drop(client);
        drop(permit);
        self.set_phase(SessionPhase::Closed);
        debug!("Session {}: closed.", self.id);
    }

    /// Runs the connect handshake, bounded by the configured timeout.
    ///
    /// A cancellation drops the in-flight attempt at once. A cancellation that
    /// lands before the first poll never issues the connect.
    async fn connect(&self, client: &mut dyn UpstreamClient) -> ConnectOutcome {
        if self.cancel.is_cancelled() {
            debug!("Session {}: cancelled before connecting.", self.id);
            self.set_phase(SessionPhase::Disconnecting);
            return ConnectOutcome::Cancelled;
        }

        let timeout = self.ctx.config.connect_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Session {}: connect to room '{}' abandoned.", self.id, self.room);
                self.set_phase(SessionPhase::Disconnecting);
                ConnectOutcome::Cancelled
            }
            result = tokio::time::timeout(timeout, client.connect()) => match result {
                Ok(Ok(state)) => ConnectOutcome::Connected(state),
                Ok(Err(e)) => ConnectOutcome::Failed(RelayError::from(e).to_string()),
                Err(_) => ConnectOutcome::Failed(RelayError::ConnectTimeout.to_string()),
            },
        }
    }

    /// Forwards upstream events in arrival order until a terminal event or cancellation.
    async fn relay(&self, mut events: mpsc::Receiver<UpstreamEvent>) -> Teardown {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Teardown::Cancelled,
                event = events.recv() => match event {
                    Some(UpstreamEvent::Message(event)) => {
                        if !self.forward(event) {
                            return Teardown::Cancelled;
                        }
                    }
                    Some(UpstreamEvent::StreamEnd) => return Teardown::StreamEnd,
                    Some(UpstreamEvent::Disconnected(reason)) => return Teardown::Disconnected(reason),
                    None => return Teardown::Disconnected("upstream connection closed".into()),
                },
            }
        }
    }

    /// Dispatches gifts, then hands the event to the subscriber without waiting.
    /// Returns `false` once the subscriber is gone.
    fn forward(&self, event: RelayedEvent) -> bool {
        if let Some(gift) = GiftEvent::from_relayed(&event) {
            self.ctx.gifts.dispatch(gift.name);
        }

        let name = event.kind.as_str();
        match self.outbound.try_send(OutboundEvent::Event(event)) {
            Ok(()) => {
                debug!("Session {}: relayed '{}'.", self.id, name);
                metrics::RELAYED_EVENTS_TOTAL.with_label_values(&[name]).inc();
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Session {}: subscriber buffer full, dropped '{}'.", self.id, name);
                metrics::DROPPED_EVENTS_TOTAL.inc();
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Delivers a lifecycle signal. Nothing is delivered once the session is
    /// cancelled, including while waiting for room in the subscriber's buffer.
    async fn emit(&self, event: OutboundEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            biased;
            res = self.outbound.send(event) => {
                if res.is_err() {
                    debug!("Session {}: subscriber gone before lifecycle signal.", self.id);
                }
            }
            _ = self.cancel.cancelled() => {
                warn!("Session {}: lifecycle signal dropped after cancellation.", self.id);
            }
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        let previous = self.phase.send_replace(phase);
        debug!("Session {}: {} -> {}", self.id, previous, phase);
    }
}
