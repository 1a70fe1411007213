// src/server/initialization.rs

//! Builds the shared state and binds the gateway listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = ServerState::initialize(config);
    info!("Server state initialized.");

    let listener = TcpListener::bind((state.config.host.as_str(), state.config.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind gateway on {}:{}",
                state.config.host, state.config.port
            )
        })?;
    info!(
        "liverelay listening on ws://{}:{}/ws",
        state.config.host, state.config.port
    );

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    let rl = &config.rate_limit;
    if rl.enabled {
        info!(
            "Rate limiting enabled: {} concurrent sessions and {} attempts per {:?} per origin.",
            rl.max_concurrent_sessions, rl.max_attempts_per_window, rl.window
        );
        if rl.max_global_sessions > 0 {
            info!("Global session cap: {}.", rl.max_global_sessions);
        }
    } else {
        warn!("Rate limiting is disabled. Set ENABLE_RATE_LIMIT=1 to protect the upstream provider.");
    }
    if config.session_id.is_some() {
        info!("An upstream session id is configured and will be injected into every session.");
    }
    info!(
        "Subscriber limit: {}, connect timeout: {:?}.",
        config.max_clients, config.session.connect_timeout
    );
}
