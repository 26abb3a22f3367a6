//! Session identity and lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Stable identifier for one visitor session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Id handed out when the record store cannot be reached. Flows running
    /// under it proceed without persistence.
    pub const OFFLINE: &'static str = "offline-local";

    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn offline() -> Self {
        Self(Self::OFFLINE.to_string())
    }

    pub fn is_offline(&self) -> bool {
        self.0 == Self::OFFLINE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Waiting for an operator to accept the visitor
    Pending,
    /// Accepted; the visitor is being walked through the gameplan
    Active,
    /// Closed by the operator (terminal)
    Ended,
    /// Closed and blocked by the operator (terminal)
    Banned,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 4] = [
        SessionStatus::Pending,
        SessionStatus::Active,
        SessionStatus::Ended,
        SessionStatus::Banned,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Banned)
    }

    /// Whether an operator may move a session from `self` to `next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::{Active, Banned, Ended, Pending};
        matches!(
            (self, next),
            (Pending, Active | Ended | Banned) | (Active, Ended | Banned)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Banned => "banned",
        };
        f.write_str(s)
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SessionStatus::Pending),
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            "banned" => Ok(SessionStatus::Banned),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// One tracked visitor session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    /// Origin network address as reported by the edge
    #[serde(default)]
    pub address: Option<String>,
    /// Client signature (user agent or equivalent)
    #[serde(default)]
    pub client_signature: Option<String>,
    /// Operator that accepted the session
    #[serde(default)]
    pub operator_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Origin metadata supplied when a session is first created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionOrigin {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub client_signature: Option<String>,
}
