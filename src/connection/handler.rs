// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a subscriber connection.

use super::guard::ConnectionGuard;
use super::session::SubscriberState;
use crate::core::RelayError;
use crate::core::limiter::{Admission, OriginKey};
use crate::core::protocol::{ClientCommand, ServerFrame};
use crate::core::state::{ClientInfo, ServerState};
use axum::extract::ws::{Message, WebSocket};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, broadcast, mpsc};
use tracing::{debug, info};

/// Manages the full lifecycle of a subscriber connection.
pub struct ConnectionHandler {
    socket: WebSocket,
    addr: SocketAddr,
    origin: OriginKey,
    state: Arc<ServerState>,
    client_id: u64,
    global_shutdown_rx: broadcast::Receiver<()>,
    statistics_rx: broadcast::Receiver<usize>,
    subscriber: SubscriberState,
}

impl ConnectionHandler {
    pub fn new(
        socket: WebSocket,
        addr: SocketAddr,
        origin: OriginKey,
        state: Arc<ServerState>,
        global_shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let client_id = state.next_client_id();
        let statistics_rx = state.statistics_tx.subscribe();
        Self {
            socket,
            addr,
            origin,
            state,
            client_id,
            global_shutdown_rx,
            statistics_rx,
            subscriber: SubscriberState::new(),
        }
    }

    /// The main event loop for the connection: inbound requests, session
    /// events, statistics ticks, and shutdown.
    pub async fn run(&mut self, permit: OwnedSemaphorePermit) -> Result<(), RelayError> {
        let _guard = ConnectionGuard::new(
            self.state.clone(),
            ClientInfo::new(self.client_id, self.addr, self.origin.clone()),
            permit,
        );
        info!(
            "Subscriber {} connected from {} (origin {}).",
            self.client_id, self.addr, self.origin
        );

        let result = loop {
            tokio::select! {
                biased;
                _ = self.global_shutdown_rx.recv() => {
                    info!("Connection handler for {} received GLOBAL shutdown signal.", self.addr);
                    if let Some(session) = self.subscriber.session.as_mut() {
                        session.shutdown().await;
                    }
                    let _ = self.socket.send(Message::Close(None)).await;
                    break Ok(());
                }
                event = self.subscriber.next_event() => match event {
                    Some(event) => {
                        if let Err(e) = self.send_frame(ServerFrame::from(event)).await {
                            break Err(e);
                        }
                    }
                    None => self.subscriber.events = None,
                },
                tick = self.statistics_rx.recv() => match tick {
                    Ok(count) => {
                        if let Err(e) = self.send_frame(ServerFrame::statistic(count)).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Subscriber {} skipped {} statistics ticks.", self.client_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                },
                message = self.socket.recv() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.process_text(text.as_str()).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Connection from {} closed by peer.", self.addr);
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Connection error for {}: {}", self.addr, e);
                        break Ok(());
                    }
                },
            }
        };

        // Teardown continues in the session's driver after the subscriber is gone.
        self.subscriber.cancel();
        info!("Subscriber {} disconnected.", self.client_id);
        result
    }

    /// Parses one inbound text frame and acts on it. Malformed frames are ignored.
    async fn process_text(&mut self, text: &str) -> Result<(), RelayError> {
        match ClientCommand::parse(text) {
            Ok(ClientCommand::SetUniqueId { unique_id, options }) => {
                self.handle_set_unique_id(unique_id, options).await
            }
            Err(e) => {
                debug!("Subscriber {}: ignoring frame: {}", self.client_id, e);
                Ok(())
            }
        }
    }

    /// Admits and starts a new session for the subscriber.
    async fn handle_set_unique_id(
        &mut self,
        unique_id: String,
        options: Value,
    ) -> Result<(), RelayError> {
        self.state.stats.increment_session_requests();
        if let Some(mut info) = self.state.clients.get_mut(&self.client_id) {
            info.last_request_time = Instant::now();
        }

        if self.subscriber.has_live_session() {
            return self
                .send_frame(ServerFrame::disconnected(
                    RelayError::AlreadyStarted.to_string(),
                ))
                .await;
        }

        let permit = match self.state.limiter.admit(&self.origin) {
            Admission::Allowed(permit) => permit,
            Admission::Denied(reason) => {
                self.state.stats.increment_denials();
                return self
                    .send_frame(ServerFrame::disconnected(reason.to_string()))
                    .await;
            }
        };

        let mut session = self.state.new_session(self.client_id);
        let (tx, rx) = mpsc::channel(self.state.config.session.outbound_buffer);
        let started = session.start(&unique_id, options, permit, tx);
        self.subscriber.session = Some(session);

        match started {
            Ok(()) => {
                self.subscriber.events = Some(rx);
                if let Some(mut info) = self.state.clients.get_mut(&self.client_id) {
                    info.room = Some(unique_id);
                }
                Ok(())
            }
            Err(e) => {
                self.subscriber.events = None;
                self.send_frame(ServerFrame::disconnected(e.to_string()))
                    .await
            }
        }
    }

    async fn send_frame(&mut self, frame: ServerFrame) -> Result<(), RelayError> {
        let text = frame.to_text()?;
        self.socket.send(Message::Text(text.into())).await.map_err(|e| {
            debug!("Failed to write to subscriber {}: {}", self.addr, e);
            RelayError::from(e)
        })
    }
}
