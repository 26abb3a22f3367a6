//! Step state endpoints.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::bus::Channel;
use crate::rest::dto::{ForceWaitRequest, IncrementResponse, SetStepRequest};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::sse::payload_stream;
use crate::rest::state::ApiState;
use crate::types::{SessionId, StepState};

/// Get the session's step state
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/step",
    tag = "Steps",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Step state", body = StepState),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<Json<StepState>, ApiError> {
    Ok(Json(state.services.steps.step_state(&id).await?))
}

/// Advance the step index by one
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/step/increment",
    tag = "Steps",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "New index; 0 when nothing advanced", body = IncrementResponse)
    )
)]
pub async fn increment(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<Json<IncrementResponse>, ApiError> {
    let new_index = state.services.steps.increment_step(&id).await?;
    Ok(Json(IncrementResponse { new_index }))
}

/// Operator jump to an absolute step index
#[utoipa::path(
    put,
    path = "/api/v1/sessions/{id}/step",
    tag = "Steps",
    params(("id" = String, Path, description = "Session id")),
    request_body = SetStepRequest,
    responses(
        (status = 200, description = "Updated step state", body = StepState),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn set(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<SetStepRequest>,
) -> Result<Json<StepState>, ApiError> {
    Ok(Json(state.services.steps.set_step(&id, request.step).await?))
}

/// Hold or release the visitor on the waiting view
#[utoipa::path(
    put,
    path = "/api/v1/sessions/{id}/step/force-wait",
    tag = "Steps",
    params(("id" = String, Path, description = "Session id")),
    request_body = ForceWaitRequest,
    responses(
        (status = 200, description = "Updated step state", body = StepState),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn force_wait(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<ForceWaitRequest>,
) -> Result<Json<StepState>, ApiError> {
    let updated = state
        .services
        .steps
        .set_force_wait(&id, request.force_wait)
        .await?;
    Ok(Json(updated))
}

/// Live step state changes (SSE)
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/step/stream",
    tag = "Steps",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Event stream of step state changes", body = String, content_type = "text/event-stream"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn stream(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.steps.step_state(&id).await?;
    let payloads = state.services.gateway.watch(&id, Channel::StepState);
    Ok(payload_stream(payloads, state.keep_alive()))
}
