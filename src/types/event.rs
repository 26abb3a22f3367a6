//! Session event log entries, including checkpoint records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether a checkpoint still awaits a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Waiting,
    Resolved,
}

/// Result of a resolved checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DualOutcome {
    /// Operator approved
    Good,
    /// Operator rejected
    Bad,
    /// Abandoned wait, cleared on reload or by the sweep
    Stale,
}

impl fmt::Display for DualOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DualOutcome::Good => "good",
            DualOutcome::Bad => "bad",
            DualOutcome::Stale => "stale",
        };
        f.write_str(s)
    }
}

impl FromStr for DualOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "good" => Ok(DualOutcome::Good),
            "bad" => Ok(DualOutcome::Bad),
            "stale" => Ok(DualOutcome::Stale),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Kind-specific content of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    /// A captured field value
    Input { title: String, value: String },
    /// A UI action label
    Interaction { title: String },
    /// A human-decision record
    Checkpoint {
        resolution: String,
        status: CheckpointStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<DualOutcome>,
    },
    /// Informational marker
    Marker { note: String },
}

impl EventBody {
    pub fn waiting(resolution: impl Into<String>) -> Self {
        EventBody::Checkpoint {
            resolution: resolution.into(),
            status: CheckpointStatus::Waiting,
            outcome: None,
        }
    }

    pub fn interaction(title: impl Into<String>) -> Self {
        EventBody::Interaction {
            title: title.into(),
        }
    }

    pub fn input(title: impl Into<String>, value: impl Into<String>) -> Self {
        EventBody::Input {
            title: title.into(),
            value: value.into(),
        }
    }
}

/// Borrowed view of a checkpoint record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointView<'a> {
    pub resolution: &'a str,
    pub status: CheckpointStatus,
    pub outcome: Option<DualOutcome>,
}

/// One entry in a session's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub id: EventId,
    pub session_id: SessionId,
    /// Store-assigned insertion order
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub body: EventBody,
}

impl Event {
    pub fn checkpoint(&self) -> Option<CheckpointView<'_>> {
        match &self.body {
            EventBody::Checkpoint {
                resolution,
                status,
                outcome,
            } => Some(CheckpointView {
                resolution,
                status: *status,
                outcome: *outcome,
            }),
            _ => None,
        }
    }

    pub fn is_waiting_for(&self, resolution: &str) -> bool {
        self.checkpoint()
            .is_some_and(|c| c.resolution == resolution && c.status == CheckpointStatus::Waiting)
    }

    /// Outcome of this record if it is a resolved checkpoint for `resolution`
    pub fn resolved_outcome(&self, resolution: &str) -> Option<DualOutcome> {
        let view = self.checkpoint()?;
        if view.resolution != resolution || view.status != CheckpointStatus::Resolved {
            return None;
        }
        view.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(body: EventBody) -> Event {
        Event {
            id: EventId::new(),
            session_id: SessionId::from("s1"),
            seq: 1,
            created_at: Utc::now(),
            body,
        }
    }

    #[test]
    fn test_body_serializes_with_type_tag() {
        let json = serde_json::to_value(EventBody::waiting("Code check")).unwrap();
        assert_eq!(json["type"], "checkpoint");
        assert_eq!(json["status"], "waiting");
        assert!(json.get("outcome").is_none());
    }

    #[test]
    fn test_resolved_outcome_requires_matching_resolution() {
        let ev = event(EventBody::Checkpoint {
            resolution: "A".to_string(),
            status: CheckpointStatus::Resolved,
            outcome: Some(DualOutcome::Good),
        });
        assert_eq!(ev.resolved_outcome("A"), Some(DualOutcome::Good));
        assert_eq!(ev.resolved_outcome("B"), None);
        assert!(!ev.is_waiting_for("A"));
    }

    #[test]
    fn test_non_checkpoint_has_no_view() {
        let ev = event(EventBody::interaction("Loaded page"));
        assert!(ev.checkpoint().is_none());
        assert!(ev.resolved_outcome("Loaded page").is_none());
    }
}
