//! Gameplan and step-state rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::SessionId;

/// One entry in a gameplan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Page {
    pub name: String,
}

impl Page {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Ordered sequence of pages a session is walked through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Gameplan {
    pub session_id: SessionId,
    pub pages: Vec<Page>,
    pub updated_at: DateTime<Utc>,
}

impl Gameplan {
    /// Position of the first page with the given name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.name == name)
    }

    pub fn page_at(&self, index: u32) -> Option<&Page> {
        self.pages.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Current position of a session within its gameplan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StepState {
    pub session_id: SessionId,
    pub step: u32,
    /// Holds the visitor on a waiting view regardless of the current step
    #[serde(default)]
    pub force_wait: bool,
    pub updated_at: DateTime<Utc>,
}
