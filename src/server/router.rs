// src/server/router.rs

//! The HTTP surface of the gateway: the `/ws` upgrade endpoint.

use crate::connection::ConnectionHandler;
use crate::core::limiter::OriginKey;
use crate::core::state::ServerState;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// State shared by every gateway request.
#[derive(Clone)]
pub struct GatewayState {
    pub state: Arc<ServerState>,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Builds the gateway router. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: Arc<ServerState>, shutdown_tx: broadcast::Sender<()>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(GatewayState { state, shutdown_tx })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(gateway): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let permit = match gateway.state.client_permits.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!(
                "Rejecting subscriber from {}: max_clients ({}) reached.",
                addr, gateway.state.config.max_clients
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "subscriber limit reached").into_response();
        }
    };

    let forwarded_for = headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok());
    let origin = OriginKey::resolve(
        addr,
        forwarded_for,
        gateway.state.config.rate_limit.trust_loopback_proxy,
    );
    let shutdown_rx = gateway.shutdown_tx.subscribe();
    let state = gateway.state;

    ws.on_upgrade(move |socket| async move {
        let mut handler = ConnectionHandler::new(socket, addr, origin, state, shutdown_rx);
        if let Err(e) = handler.run(permit).await {
            debug!("Connection from {} terminated: {}", addr, e);
        }
    })
}
