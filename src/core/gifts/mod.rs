// src/core/gifts/mod.rs

//! Maps gift display names to side-effecting reactions.
//!
//! Lookup is an exact, case-sensitive match on the display name as the
//! upstream provider sends it. Names are never normalised: `Cotton’s Shell`
//! (U+2019) and `Cotton's Shell` are different keys.

use crate::config::GiftsConfig;
use crate::core::metrics;
use crate::core::upstream::{EventKind, RelayedEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{error, info};

pub mod catalog;

/// A zero-argument gift reaction. Errors and panics are contained by the dispatcher.
pub type GiftHandler = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Unhandled,
}

/// A gift sub-event as seen by the dispatcher. Borrowed from the relayed event.
#[derive(Debug, Clone, Copy)]
pub struct GiftEvent<'a> {
    pub name: &'a str,
    pub payload: &'a Value,
}

impl<'a> GiftEvent<'a> {
    /// Extracts the gift from a relayed event. `None` for non-gift events and
    /// for gifts without a usable `giftName`.
    pub fn from_relayed(event: &'a RelayedEvent) -> Option<Self> {
        if event.kind != EventKind::Gift {
            return None;
        }
        let name = event
            .payload
            .get("giftName")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())?;
        Some(Self {
            name,
            payload: &event.payload,
        })
    }
}

#[derive(Clone, Default)]
pub struct GiftDispatcher {
    handlers: HashMap<String, GiftHandler>,
}

impl fmt::Debug for GiftDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GiftDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl GiftDispatcher {
    /// An empty table. Every gift is unhandled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from the builtin catalog, adjusted by configuration.
    pub fn from_config(config: &GiftsConfig) -> Self {
        let mut dispatcher = Self::new();
        if !config.enabled {
            info!("Gift reactions are disabled.");
            return dispatcher;
        }
        for name in catalog::BUILTIN_GIFTS {
            dispatcher.register(name, catalog::reaction(name));
        }
        for name in &config.extra {
            dispatcher.register(name.clone(), catalog::reaction(name));
        }
        for name in &config.disabled {
            dispatcher.unregister(name);
        }
        info!("Gift dispatcher ready with {} reactions.", dispatcher.len());
        dispatcher
    }

    /// Binds `name` to `handler`, replacing any previous binding.
    pub fn register(&mut self, name: impl Into<String>, handler: GiftHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the reaction bound to `name`, if any.
    ///
    /// A failing or panicking handler is logged and still counts as handled.
    pub fn dispatch(&self, name: &str) -> DispatchOutcome {
        info!("gift: {} received", name);
        let Some(handler) = self.handlers.get(name) else {
            info!("Unhandled gift: {}", name);
            metrics::GIFTS_DISPATCHED_TOTAL
                .with_label_values(&["unhandled"])
                .inc();
            return DispatchOutcome::Unhandled;
        };

        match catch_unwind(AssertUnwindSafe(|| handler())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Gift handler for '{}' failed: {:#}", name, e);
                metrics::GIFT_HANDLER_FAULTS_TOTAL.inc();
            }
            Err(panic) => {
                error!(
                    "Gift handler for '{}' panicked: {}",
                    name,
                    panic_message(panic.as_ref())
                );
                metrics::GIFT_HANDLER_FAULTS_TOTAL.inc();
            }
        }
        metrics::GIFTS_DISPATCHED_TOTAL
            .with_label_values(&["handled"])
            .inc();
        DispatchOutcome::Handled
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
