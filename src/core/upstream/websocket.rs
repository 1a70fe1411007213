// src/core/upstream/websocket.rs

//! An `UpstreamConnector` that reaches the provider through a JSON-over-WebSocket
//! bridge. Every frame on the bridge is `{"event": <name>, "data": <value>}`.

use super::{
    ConnectOptions, EventKind, RelayedEvent, RoomState, UpstreamClient, UpstreamConnector,
    UpstreamError, UpstreamEvent,
};
use crate::config::UpstreamConfig;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

type BridgeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The placeholder substituted with the percent-encoded room id.
pub const ROOM_PLACEHOLDER: &str = "{room}";

const CLOSED_REASON: &str = "upstream connection closed";

/// A single bridge frame.
#[derive(Debug, Deserialize)]
struct BridgeFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone)]
pub struct WsUpstreamConnector {
    url_template: String,
    event_buffer: usize,
}

impl WsUpstreamConnector {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            url_template: config.url.clone(),
            event_buffer: config.event_buffer,
        }
    }

    /// Resolves the bridge endpoint for a room.
    pub fn endpoint_for(&self, room: &str) -> Result<Url, UpstreamError> {
        let room = room.trim();
        if room.is_empty() {
            return Err(UpstreamError::InvalidRoom("room id cannot be empty".into()));
        }
        let raw = self
            .url_template
            .replace(ROOM_PLACEHOLDER, &urlencoding::encode(room));
        let url = Url::parse(&raw).map_err(|e| UpstreamError::InvalidEndpoint(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(UpstreamError::InvalidEndpoint(format!(
                "unsupported scheme '{other}'"
            ))),
        }
    }
}

impl UpstreamConnector for WsUpstreamConnector {
    fn create(
        &self,
        room: &str,
        options: ConnectOptions,
    ) -> Result<Box<dyn UpstreamClient>, UpstreamError> {
        let endpoint = self.endpoint_for(room)?;
        Ok(Box::new(WsUpstreamClient {
            endpoint,
            options,
            event_buffer: self.event_buffer,
            sink: None,
            events: None,
            reader: None,
        }))
    }
}

pub struct WsUpstreamClient {
    endpoint: Url,
    options: ConnectOptions,
    event_buffer: usize,
    sink: Option<SplitSink<BridgeStream, Message>>,
    events: Option<mpsc::Receiver<UpstreamEvent>>,
    reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl UpstreamClient for WsUpstreamClient {
    async fn connect(&mut self) -> Result<RoomState, UpstreamError> {
        let (ws, _resp) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let hello = json!({ "event": "connect", "data": self.options });
        sink.send(Message::Text(hello.to_string().into()))
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let state = await_handshake(&mut stream).await?;
        debug!("Bridge handshake completed for {}", self.endpoint);

        let (tx, rx) = mpsc::channel(self.event_buffer);
        self.reader = Some(tokio::spawn(pump_events(stream, tx)));
        self.sink = Some(sink);
        self.events = Some(rx);
        Ok(state)
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<UpstreamEvent>> {
        self.events.take()
    }

    async fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take()
            && let Err(e) = sink.close().await
        {
            debug!("Error while closing bridge connection: {}", e);
        }
        self.events = None;
    }
}

impl Drop for WsUpstreamClient {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Waits for the bridge to accept or reject the room.
async fn await_handshake(
    stream: &mut SplitStream<BridgeStream>,
) -> Result<RoomState, UpstreamError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: BridgeFrame = serde_json::from_str(text.as_str())
                    .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
                match frame.event.as_str() {
                    "connected" => return Ok(RoomState(frame.data)),
                    "error" | "disconnected" => {
                        return Err(UpstreamError::Rejected(reason_of(&frame.data)));
                    }
                    other => debug!("Ignoring '{}' frame before handshake completion.", other),
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(UpstreamError::Transport(
                    "upstream closed the connection during handshake".into(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(UpstreamError::Transport(e.to_string())),
        }
    }
}

/// Reads bridge frames and forwards them, in order, to the session's event channel.
async fn pump_events(mut stream: SplitStream<BridgeStream>, tx: mpsc::Sender<UpstreamEvent>) {
    loop {
        let event = match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<BridgeFrame>(text.as_str()) {
                Ok(frame) => match translate_frame(frame) {
                    Some(event) => event,
                    None => continue,
                },
                Err(e) => {
                    debug!("Skipping malformed bridge frame: {}", e);
                    continue;
                }
            },
            Some(Ok(Message::Close(_))) | None => UpstreamEvent::Disconnected(CLOSED_REASON.into()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("Bridge transport error: {}", e);
                UpstreamEvent::Disconnected(e.to_string())
            }
        };

        let terminal = !matches!(event, UpstreamEvent::Message(_));
        if tx.send(event).await.is_err() || terminal {
            return;
        }
    }
}

fn translate_frame(frame: BridgeFrame) -> Option<UpstreamEvent> {
    match frame.event.as_str() {
        "streamEnd" => Some(UpstreamEvent::StreamEnd),
        "disconnected" | "error" => Some(UpstreamEvent::Disconnected(reason_of(&frame.data))),
        name => match EventKind::from_str(name) {
            Ok(kind) => Some(UpstreamEvent::Message(RelayedEvent::new(kind, frame.data))),
            Err(_) => {
                debug!("Skipping unknown upstream event '{}'.", name);
                None
            }
        },
    }
}

fn reason_of(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Null => CLOSED_REASON.to_string(),
        other => other
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}
