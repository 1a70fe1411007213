// src/core/tasks/statistics.rs

//! A background task that periodically publishes the global session count.

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub struct StatisticsBroadcasterTask {
    state: Arc<ServerState>,
}

impl StatisticsBroadcasterTask {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Reads the registry on every tick and publishes it to all subscribers.
    /// Ticks with no subscribers are skipped silently.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.state.config.statistics_interval;
        info!("Statistics broadcaster started (every {:?}).", period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let count = self.state.registry.current();
                    match self.state.statistics_tx.send(count) {
                        Ok(receivers) => debug!("Published globalConnectionCount={} to {} subscribers.", count, receivers),
                        Err(_) => debug!("No subscribers for statistics tick."),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Statistics broadcaster shutting down.");
                    return;
                }
            }
        }
    }
}
