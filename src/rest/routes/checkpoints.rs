//! Checkpoint endpoints: open, query, resolve and watch human decisions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures_util::StreamExt;

use crate::bus::Payload;
use crate::checkpoint::{OpenOutcome, ResolveStatus};
use crate::error::require_label;
use crate::rest::dto::{ResolutionQuery, ResolutionRequest, ResolveRequest, WaitingResponse};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::sse::payload_stream;
use crate::rest::state::ApiState;
use crate::types::{DualOutcome, Event, SessionId};

/// Whether a checkpoint is waiting for the resolution
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/checkpoints/waiting",
    tag = "Checkpoints",
    params(("id" = String, Path, description = "Session id"), ResolutionQuery),
    responses(
        (status = 200, description = "Waiting flag", body = WaitingResponse),
        (status = 400, description = "Blank resolution", body = ErrorResponse)
    )
)]
pub async fn waiting(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Query(query): Query<ResolutionQuery>,
) -> Result<Json<WaitingResponse>, ApiError> {
    let waiting = state
        .services
        .checkpoints
        .exists(&id, &query.resolution)
        .await?;
    Ok(Json(WaitingResponse { waiting }))
}

/// Most recent record for the resolution, in any status
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/checkpoints/latest",
    tag = "Checkpoints",
    params(("id" = String, Path, description = "Session id"), ResolutionQuery),
    responses(
        (status = 200, description = "Latest record, or null", body = Option<Event>),
        (status = 400, description = "Blank resolution", body = ErrorResponse)
    )
)]
pub async fn latest(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Query(query): Query<ResolutionQuery>,
) -> Result<Json<Option<Event>>, ApiError> {
    Ok(Json(
        state
            .services
            .checkpoints
            .latest(&id, &query.resolution)
            .await?,
    ))
}

/// All checkpoints currently waiting on the operator, newest first
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/checkpoints",
    tag = "Checkpoints",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Waiting records", body = Vec<Event>)
    )
)]
pub async fn list_waiting(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(state.services.checkpoints.waiting(&id).await?))
}

/// Open a waiting checkpoint, reusing one already waiting
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/checkpoints",
    tag = "Checkpoints",
    params(("id" = String, Path, description = "Session id")),
    request_body = ResolutionRequest,
    responses(
        (status = 201, description = "Checkpoint opened", body = OpenOutcome),
        (status = 200, description = "Existing waiting checkpoint reused", body = OpenOutcome),
        (status = 400, description = "Blank resolution", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn open(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<ResolutionRequest>,
) -> Result<(StatusCode, Json<OpenOutcome>), ApiError> {
    let outcome = state
        .services
        .checkpoints
        .open(&id, &request.resolution)
        .await?;
    let code = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(outcome)))
}

/// Operator decision on the most recent waiting checkpoint
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/checkpoints/resolve",
    tag = "Checkpoints",
    params(("id" = String, Path, description = "Session id")),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Resolved record, or missing when nothing waited", body = ResolveStatus),
        (status = 400, description = "Unknown outcome or blank resolution", body = ErrorResponse)
    )
)]
pub async fn resolve(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveStatus>, ApiError> {
    let outcome: DualOutcome = request
        .outcome
        .parse()
        .map_err(ApiError::ValidationError)?;
    let status = state
        .services
        .checkpoints
        .resolve(&id, &request.resolution, outcome)
        .await?;
    Ok(Json(status))
}

/// Resolve an abandoned wait as stale
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/checkpoints/clear-stale",
    tag = "Checkpoints",
    params(("id" = String, Path, description = "Session id")),
    request_body = ResolutionRequest,
    responses(
        (status = 200, description = "Stale record, or missing when nothing waited", body = ResolveStatus),
        (status = 400, description = "Blank resolution", body = ErrorResponse)
    )
)]
pub async fn clear_stale(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<ResolutionRequest>,
) -> Result<Json<ResolveStatus>, ApiError> {
    Ok(Json(
        state
            .services
            .checkpoints
            .clear_if_stale(&id, &request.resolution)
            .await?,
    ))
}

/// Resolved records for one resolution as they land (SSE)
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/checkpoints/stream",
    tag = "Checkpoints",
    params(("id" = String, Path, description = "Session id"), ResolutionQuery),
    responses(
        (status = 200, description = "Event stream of resolved checkpoint records", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Blank resolution", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn stream(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Query(query): Query<ResolutionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_label("resolution", &query.resolution)?;
    state.services.sessions.get(&id).await?;
    let payloads = state
        .services
        .gateway
        .watch_resolution(&id, &query.resolution)
        .map(Payload::Events);
    Ok(payload_stream(payloads, state.keep_alive()))
}
