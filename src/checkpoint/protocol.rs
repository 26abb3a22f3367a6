//! Checkpoint state machine per (session, resolution):
//! absent -> waiting -> resolved(good | bad | stale).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{require_label, WaypointError};
use crate::gateway::Gateway;
use crate::store::StoreError;
use crate::types::{DualOutcome, Event, EventBody, SessionId};

/// Result of [`CheckpointProtocol::open`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OpenOutcome {
    /// The waiting record for the pair
    pub event: Event,
    /// False when a waiting record already existed and was reused
    pub created: bool,
}

/// Result of a resolve attempt. `Missing` is a valid outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResolveStatus {
    Success { event: Event },
    Missing,
}

impl ResolveStatus {
    pub fn is_missing(&self) -> bool {
        matches!(self, ResolveStatus::Missing)
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            ResolveStatus::Success { event } => Some(event),
            ResolveStatus::Missing => None,
        }
    }
}

#[derive(Clone)]
pub struct CheckpointProtocol {
    gateway: Gateway,
}

impl CheckpointProtocol {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// True iff a waiting record exists for the pair
    pub async fn exists(&self, id: &SessionId, resolution: &str) -> Result<bool, WaypointError> {
        require_label("resolution", resolution)?;
        Ok(self.gateway.waiting_checkpoint(id, resolution).await?.is_some())
    }

    /// Open a waiting checkpoint, reusing the one already waiting for the pair.
    ///
    /// The store rejects a second waiting record for the same pair, so two
    /// opens racing past the existence check still converge on one record.
    pub async fn open(&self, id: &SessionId, resolution: &str) -> Result<OpenOutcome, WaypointError> {
        require_label("resolution", resolution)?;

        if let Some(event) = self.gateway.waiting_checkpoint(id, resolution).await? {
            tracing::debug!(session_id = %id, resolution, event_id = %event.id, "checkpoint already waiting");
            return Ok(OpenOutcome {
                event,
                created: false,
            });
        }

        match self
            .gateway
            .insert_event(id, EventBody::waiting(resolution))
            .await
        {
            Ok(event) => {
                tracing::info!(session_id = %id, resolution, event_id = %event.id, "checkpoint opened");
                Ok(OpenOutcome {
                    event,
                    created: true,
                })
            }
            Err(StoreError::DuplicateWaiting { existing }) => {
                tracing::warn!(
                    session_id = %id,
                    resolution,
                    event_id = %existing.id,
                    "concurrent checkpoint open, using existing waiting record"
                );
                Ok(OpenOutcome {
                    event: *existing,
                    created: false,
                })
            }
            Err(err) => Err(WaypointError::from_store(err)),
        }
    }

    /// Resolve the most recent waiting record for the pair
    pub async fn resolve(
        &self,
        id: &SessionId,
        resolution: &str,
        outcome: DualOutcome,
    ) -> Result<ResolveStatus, WaypointError> {
        require_label("resolution", resolution)?;
        match self.gateway.resolve_waiting(id, resolution, outcome).await? {
            Some(event) => {
                tracing::info!(session_id = %id, resolution, %outcome, "checkpoint resolved");
                Ok(ResolveStatus::Success { event })
            }
            None => {
                tracing::debug!(session_id = %id, resolution, "nothing waiting to resolve");
                Ok(ResolveStatus::Missing)
            }
        }
    }

    /// Resolve an abandoned wait as stale. No-op when nothing is waiting.
    pub async fn clear_if_stale(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> Result<ResolveStatus, WaypointError> {
        self.resolve(id, resolution, DualOutcome::Stale).await
    }

    /// Resolve one specific record as stale, only while it is still waiting.
    /// A record resolved in the meantime, or replaced by a newer cycle,
    /// yields `Missing` and the newer wait is left alone.
    pub async fn clear_stale_record(&self, event: &Event) -> Result<ResolveStatus, WaypointError> {
        match self.gateway.resolve_event(&event.id, DualOutcome::Stale).await? {
            Some(event) => {
                tracing::info!(session_id = %event.session_id, event_id = %event.id, "stale checkpoint cleared");
                Ok(ResolveStatus::Success { event })
            }
            None => Ok(ResolveStatus::Missing),
        }
    }

    /// Most recent record for the pair, in any status
    pub async fn latest(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> Result<Option<Event>, WaypointError> {
        require_label("resolution", resolution)?;
        Ok(self.gateway.latest_checkpoint(id, resolution).await?)
    }

    /// Waiting records for the session, newest first
    pub async fn waiting(&self, id: &SessionId) -> Result<Vec<Event>, WaypointError> {
        Ok(self.gateway.waiting_checkpoints(id).await?)
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}
