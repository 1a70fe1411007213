// src/server/connection_loop.rs

//! Serves the gateway and handles graceful shutdown.

use super::context::ServerContext;
use super::router::router;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves subscribers until a signal arrives or a critical task fails, then
/// shuts everything down.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let app = router(ctx.state.clone(), ctx.shutdown_tx.clone())
        .into_make_service_with_connect_info::<SocketAddr>();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(ctx.listener, app).with_graceful_shutdown(async move {
        stop_rx.await.ok();
    });
    let mut server_task = tokio::spawn(async move { server.await });

    let mut server_finished = false;
    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {:#}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = &mut server_task => {
                server_finished = true;
                match res {
                    Ok(Ok(())) => warn!("Gateway server stopped unexpectedly."),
                    Ok(Err(e)) => error!("CRITICAL: Gateway server failed: {}. Shutting down.", e),
                    Err(e) => error!("CRITICAL: Gateway server panicked: {e:?}. Shutting down."),
                }
                break;
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("No task was listening for the shutdown signal.");
    }
    let _ = stop_tx.send(());

    if !server_finished {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server_task).await {
            Ok(_) => info!("Gateway stopped accepting subscribers."),
            Err(_) => {
                warn!("Timed out waiting for the gateway to stop.");
                server_task.abort();
            }
        }
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!(
        "Server shutdown complete. {} subscribers served, {} session requests, {} denied.",
        ctx.state.stats.get_total_connections(),
        ctx.state.stats.get_session_requests(),
        ctx.state.stats.get_denials()
    );
    Ok(())
}
