//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::checkpoint::{OpenOutcome, ResolveStatus};
use crate::rest::dto::{
    AppendPageRequest, CreateSessionRequest, CreateSessionResponse, CreateStatus,
    ForceWaitRequest, HealthResponse, IncrementResponse, PlanAndStep, RedirectRequest,
    ReorderRequest, ResolutionRequest, ResolveRequest, SetPagesRequest, SetStatusRequest,
    SetStepRequest, StatusResponse, WaitingResponse,
};
use crate::rest::error::ErrorResponse;
use crate::sessions::{SessionSettings, SettingsUpdate, StatusCounts};
use crate::steps::Redirect;
use crate::types::{
    CheckpointStatus, DualOutcome, Event, EventBody, Gameplan, Page, Session, SessionStatus,
    StepState,
};

/// OpenAPI documentation for the waypoint REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Waypoint API",
        description = "Operator-guided multi-step sessions with checkpoint approvals.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Settings
        crate::rest::routes::settings::get_settings,
        crate::rest::routes::settings::update_settings,
        // Session endpoints
        crate::rest::routes::sessions::create,
        crate::rest::routes::sessions::list,
        crate::rest::routes::sessions::get_one,
        crate::rest::routes::sessions::set_status,
        crate::rest::routes::sessions::stream,
        // Step endpoints
        crate::rest::routes::steps::get_one,
        crate::rest::routes::steps::increment,
        crate::rest::routes::steps::set,
        crate::rest::routes::steps::force_wait,
        crate::rest::routes::steps::stream,
        // Gameplan endpoints
        crate::rest::routes::gameplan::get_one,
        crate::rest::routes::gameplan::set_pages,
        crate::rest::routes::gameplan::append_page,
        crate::rest::routes::gameplan::redirect,
        crate::rest::routes::gameplan::reorder,
        crate::rest::routes::gameplan::stream,
        // Event endpoints
        crate::rest::routes::events::list,
        crate::rest::routes::events::add,
        crate::rest::routes::events::stream,
        // Checkpoint endpoints
        crate::rest::routes::checkpoints::waiting,
        crate::rest::routes::checkpoints::latest,
        crate::rest::routes::checkpoints::list_waiting,
        crate::rest::routes::checkpoints::open,
        crate::rest::routes::checkpoints::resolve,
        crate::rest::routes::checkpoints::clear_stale,
        crate::rest::routes::checkpoints::stream,
    ),
    components(
        schemas(
            // Records
            Session,
            SessionStatus,
            StepState,
            Gameplan,
            Page,
            Event,
            EventBody,
            CheckpointStatus,
            DualOutcome,
            // Response types
            HealthResponse,
            StatusResponse,
            StatusCounts,
            CreateSessionResponse,
            CreateStatus,
            IncrementResponse,
            Redirect,
            PlanAndStep,
            WaitingResponse,
            OpenOutcome,
            ResolveStatus,
            SessionSettings,
            ErrorResponse,
            // Request types
            CreateSessionRequest,
            SetStatusRequest,
            SetStepRequest,
            ForceWaitRequest,
            SetPagesRequest,
            AppendPageRequest,
            RedirectRequest,
            ReorderRequest,
            ResolutionRequest,
            ResolveRequest,
            SettingsUpdate,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Settings", description = "Runtime session-creation policy"),
        (name = "Sessions", description = "Session creation, lookup and operator status changes"),
        (name = "Steps", description = "Per-session step index and force-wait flag"),
        (name = "Gameplan", description = "Per-session page sequence"),
        (name = "Events", description = "Per-session event log"),
        (name = "Checkpoints", description = "Suspend-and-wait operator decisions"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }

    /// Generate the OpenAPI specification as a YAML string
    pub fn yaml() -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&Self::openapi())
    }
}
