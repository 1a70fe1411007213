// src/connection/mod.rs

//! Manages the lifecycle of a single subscriber WebSocket connection: request
//! parsing, admission, the subscriber's session, and outbound relay.

mod guard;
mod handler;
mod session;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use session::SubscriberState;
