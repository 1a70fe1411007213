// src/core/protocol.rs

//! The subscriber wire format.
//!
//! Every WebSocket text frame, in both directions, is a JSON object
//! `{"event": <name>, "data": <value>}`.

use crate::core::errors::RelayError;
use crate::core::session::OutboundEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::borrow::Cow;

pub const SET_UNIQUE_ID: &str = "setUniqueId";
pub const CONNECTED: &str = "tiktokConnected";
pub const DISCONNECTED: &str = "tiktokDisconnected";
pub const STREAM_END: &str = "streamEnd";
pub const STATISTIC: &str = "statistic";

#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A request sent by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Start a session for `unique_id` with caller-supplied upstream options.
    SetUniqueId { unique_id: String, options: Value },
}

impl ClientCommand {
    /// Parses one inbound text frame.
    ///
    /// `setUniqueId` accepts `{"uniqueId", "options"}`, the two-element
    /// array form `[uniqueId, options]`, or a bare string.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        match frame.event.as_str() {
            SET_UNIQUE_ID => parse_set_unique_id(frame.data),
            other => Err(RelayError::InvalidRequest(format!(
                "unknown event '{other}'"
            ))),
        }
    }
}

fn parse_set_unique_id(data: Value) -> Result<ClientCommand, RelayError> {
    let (unique_id, options) = match data {
        Value::String(id) => (Value::String(id), Value::Null),
        Value::Array(mut items) => {
            let options = if items.len() > 1 {
                items.swap_remove(1)
            } else {
                Value::Null
            };
            (items.into_iter().next().unwrap_or(Value::Null), options)
        }
        Value::Object(mut map) => (
            map.remove("uniqueId").unwrap_or(Value::Null),
            map.remove("options").unwrap_or(Value::Null),
        ),
        _ => (Value::Null, Value::Null),
    };

    match unique_id {
        Value::String(unique_id) => Ok(ClientCommand::SetUniqueId { unique_id, options }),
        _ => Err(RelayError::InvalidRequest(
            "setUniqueId requires a string uniqueId".into(),
        )),
    }
}

/// A frame sent to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerFrame {
    pub event: Cow<'static, str>,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: impl Into<Cow<'static, str>>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::new(DISCONNECTED, Value::String(reason.into()))
    }

    pub fn statistic(global_connection_count: usize) -> Self {
        Self::new(
            STATISTIC,
            json!({ "globalConnectionCount": global_connection_count }),
        )
    }

    pub fn to_text(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<OutboundEvent> for ServerFrame {
    fn from(event: OutboundEvent) -> Self {
        match event {
            OutboundEvent::Connected(state) => Self::new(CONNECTED, state.0),
            OutboundEvent::Disconnected(reason) => Self::disconnected(reason),
            OutboundEvent::StreamEnd => Self::new(STREAM_END, Value::Null),
            OutboundEvent::Event(event) => Self::new(event.kind.as_str(), event.payload),
        }
    }
}
