// src/core/limiter/purger.rs

//! A background task to periodically drop idle rate-limit records.

use super::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// The interval at which the purger task runs.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

pub struct LimiterPurgerTask {
    limiter: Arc<RateLimiter>,
}

impl LimiterPurgerTask {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Rate-limit record purger task started.");
        let mut interval = tokio::time::interval(PURGE_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.limiter.purge_idle();
                    if removed > 0 {
                        debug!("Purged {} idle rate-limit records.", removed);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Rate-limit record purger task shutting down.");
                    return;
                }
            }
        }
    }
}
