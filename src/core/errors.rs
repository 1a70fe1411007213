// src/core/errors.rs

//! Defines the primary error type for the relay.

use crate::core::upstream::UpstreamError;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures surfaced by the relay core.
/// Admission denials are deliberately absent: a denial is an expected outcome,
/// not an error, and is modelled by `core::limiter::Admission`.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("session already started")]
    AlreadyStarted,

    #[error("{0}")]
    Upstream(String),

    #[error("Connection timed out")]
    ConnectTimeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Io(e) => RelayError::Io(Arc::clone(e)),
            RelayError::AlreadyStarted => RelayError::AlreadyStarted,
            RelayError::Upstream(s) => RelayError::Upstream(s.clone()),
            RelayError::ConnectTimeout => RelayError::ConnectTimeout,
            RelayError::InvalidRequest(s) => RelayError::InvalidRequest(s.clone()),
            RelayError::Json(s) => RelayError::Json(s.clone()),
            RelayError::Internal(s) => RelayError::Internal(s.clone()),
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RelayError::Io(e1), RelayError::Io(e2)) => e1.kind() == e2.kind(),
            (RelayError::Upstream(s1), RelayError::Upstream(s2)) => s1 == s2,
            (RelayError::InvalidRequest(s1), RelayError::InvalidRequest(s2)) => s1 == s2,
            (RelayError::Json(s1), RelayError::Json(s2)) => s1 == s2,
            (RelayError::Internal(s1), RelayError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Json(e.to_string())
    }
}

impl From<UpstreamError> for RelayError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Timeout => RelayError::ConnectTimeout,
            other => RelayError::Upstream(other.to_string()),
        }
    }
}

impl From<axum::Error> for RelayError {
    fn from(e: axum::Error) -> Self {
        RelayError::Io(Arc::new(std::io::Error::other(e.to_string())))
    }
}
