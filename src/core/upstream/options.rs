// src/core/upstream/options.rs

//! Sanitisation of caller-supplied upstream connection options.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Option keys that carry low-level transport or request overrides. They are
/// removed from every caller-supplied map, whatever the configuration says.
pub const ALWAYS_STRIPPED_KEYS: [&str; 2] = ["requestOptions", "websocketOptions"];

/// The key under which a server-side session id override is injected.
pub const SESSION_ID_KEY: &str = "sessionId";

/// Options forwarded to the upstream client. Only constructible through
/// `sanitize`, so an unsanitised map can never reach an `UpstreamConnector`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConnectOptions(Map<String, Value>);

impl ConnectOptions {
    /// Builds forwardable options from an arbitrary caller value.
    ///
    /// Non-object values become an empty map. Stripped keys are removed, then
    /// `session_id` (if any) is inserted so that it takes precedence over
    /// anything the caller sent.
    pub fn sanitize(raw: Value, extra_stripped: &[String], session_id: Option<&str>) -> Self {
        let mut map = match raw {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for key in ALWAYS_STRIPPED_KEYS
            .iter()
            .copied()
            .chain(extra_stripped.iter().map(String::as_str))
        {
            if map.remove(key).is_some() {
                debug!("Stripped caller-supplied upstream option '{}'.", key);
            }
        }

        if let Some(id) = session_id {
            map.insert(SESSION_ID_KEY.to_string(), Value::String(id.to_string()));
        }

        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
