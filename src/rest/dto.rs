//! Data Transfer Objects for the REST API.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::sessions::{CreateOutcome, StatusCounts};
use crate::types::{Gameplan, Page, SessionId, StepState};

// =============================================================================
// Session DTOs
// =============================================================================

/// Request to create (or reuse) a session for a visitor
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub client_signature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CreateStatus {
    Created,
    Reused,
    Closed,
    Offline,
}

/// Response to a session create request. `id` is absent for `closed`
/// and carries the offline sentinel for `offline`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionResponse {
    pub status: CreateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SessionId>,
}

impl From<CreateOutcome> for CreateSessionResponse {
    fn from(outcome: CreateOutcome) -> Self {
        match outcome {
            CreateOutcome::Created(id) => Self {
                status: CreateStatus::Created,
                id: Some(id),
            },
            CreateOutcome::Reused(id) => Self {
                status: CreateStatus::Reused,
                id: Some(id),
            },
            CreateOutcome::Closed => Self {
                status: CreateStatus::Closed,
                id: None,
            },
            CreateOutcome::Offline => Self {
                status: CreateStatus::Offline,
                id: Some(SessionId::offline()),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSessionsQuery {
    /// pending, active, ended or banned; all sessions when omitted
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    pub status: String,
    #[serde(default)]
    pub operator_id: Option<String>,
}

// =============================================================================
// Step and gameplan DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IncrementResponse {
    /// New step index; 0 means nothing advanced
    pub new_index: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetStepRequest {
    pub step: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ForceWaitRequest {
    pub force_wait: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetPagesRequest {
    pub pages: Vec<Page>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AppendPageRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedirectRequest {
    pub page: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReorderRequest {
    pub from_index: usize,
    pub to_index: usize,
}

/// Gameplan and step state after a change touching both
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlanAndStep {
    pub gameplan: Gameplan,
    pub step_state: StepState,
}

// =============================================================================
// Checkpoint DTOs
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResolutionQuery {
    pub resolution: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WaitingResponse {
    pub waiting: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolutionRequest {
    pub resolution: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveRequest {
    pub resolution: String,
    /// good, bad or stale
    pub outcome: String,
}

// =============================================================================
// Health DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub allow_new_sessions: bool,
    pub sessions: StatusCounts,
}
