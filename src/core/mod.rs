// src/core/mod.rs

//! The central module containing the relay's core logic: admission control,
//! the session supervisor, gift dispatch, and the shared server state.

pub mod errors;
pub mod gifts;
pub mod limiter;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod state;
pub mod tasks;
pub mod upstream;

pub use errors::RelayError;
pub use session::{OutboundEvent, SessionPhase, SessionSupervisor};
