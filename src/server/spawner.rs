// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::limiter::purger::LimiterPurgerTask;
use crate::core::tasks::statistics::StatisticsBroadcasterTask;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) {
    let server_state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Metrics Server ---
    if server_state.config.metrics.enabled {
        let port = server_state.config.metrics.port;
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(port, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Statistics ---
    let broadcaster = StatisticsBroadcasterTask::new(server_state.clone());
    let shutdown_rx_stats = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        broadcaster.run(shutdown_rx_stats).await;
        Ok(())
    });

    // --- Limiter Maintenance ---
    let purger = LimiterPurgerTask::new(server_state.limiter.clone());
    let shutdown_rx_purge = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        purger.run(shutdown_rx_purge).await;
        Ok(())
    });

    info!("All background tasks have been spawned.");
}
