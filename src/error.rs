//! Domain error types.

use thiserror::Error;

use crate::store::StoreError;
use crate::types::{SessionId, SessionStatus};

/// Errors surfaced by the session, step and checkpoint services
#[derive(Debug, Error)]
pub enum WaypointError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

impl WaypointError {
    /// Map store-level missing-session and transition errors onto the
    /// service variants
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => WaypointError::SessionNotFound(id),
            StoreError::InvalidTransition { from, to } => WaypointError::InvalidTransition { from, to },
            other => WaypointError::Store(other),
        }
    }
}

/// Errors raised by flow backends talking to the core
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Core(#[from] WaypointError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Reject blank checkpoint resolution labels and page names
pub(crate) fn require_label(kind: &str, value: &str) -> Result<(), WaypointError> {
    if value.trim().is_empty() {
        return Err(WaypointError::Validation(format!("{kind} must not be empty")));
    }
    Ok(())
}
