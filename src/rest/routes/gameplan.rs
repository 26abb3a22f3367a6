//! Gameplan endpoints: page sequence edits, redirects and live reorder.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::bus::Channel;
use crate::rest::dto::{
    AppendPageRequest, PlanAndStep, RedirectRequest, ReorderRequest, SetPagesRequest,
};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::sse::payload_stream;
use crate::rest::state::ApiState;
use crate::steps::Redirect;
use crate::types::{Gameplan, Page, SessionId};

/// Get the session's gameplan
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/gameplan",
    tag = "Gameplan",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Gameplan", body = Gameplan),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<Json<Gameplan>, ApiError> {
    Ok(Json(state.services.steps.gameplan(&id).await?))
}

/// Replace the page sequence
#[utoipa::path(
    put,
    path = "/api/v1/sessions/{id}/gameplan",
    tag = "Gameplan",
    params(("id" = String, Path, description = "Session id")),
    request_body = SetPagesRequest,
    responses(
        (status = 200, description = "Updated gameplan", body = Gameplan),
        (status = 400, description = "Empty sequence or blank page name", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn set_pages(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<SetPagesRequest>,
) -> Result<Json<Gameplan>, ApiError> {
    Ok(Json(state.services.steps.set_pages(&id, request.pages).await?))
}

/// Append a page at the end
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/gameplan/pages",
    tag = "Gameplan",
    params(("id" = String, Path, description = "Session id")),
    request_body = AppendPageRequest,
    responses(
        (status = 200, description = "Updated gameplan", body = Gameplan),
        (status = 400, description = "Blank page name", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn append_page(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<AppendPageRequest>,
) -> Result<Json<Gameplan>, ApiError> {
    let plan = state
        .services
        .steps
        .append_page(&id, Page::new(request.name))
        .await?;
    Ok(Json(plan))
}

/// Jump to a page by name, appending it when absent
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/gameplan/redirect",
    tag = "Gameplan",
    params(("id" = String, Path, description = "Session id")),
    request_body = RedirectRequest,
    responses(
        (status = 200, description = "Gameplan and step state after the jump", body = Redirect),
        (status = 400, description = "Blank page name", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn redirect(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<RedirectRequest>,
) -> Result<Json<Redirect>, ApiError> {
    Ok(Json(
        state
            .services
            .steps
            .redirect_to_page(&id, &request.page)
            .await?,
    ))
}

/// Move one page; the current step keeps pointing at the same page
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/gameplan/reorder",
    tag = "Gameplan",
    params(("id" = String, Path, description = "Session id")),
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Gameplan and remapped step state; unchanged for out-of-range indices", body = PlanAndStep),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn reorder(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<PlanAndStep>, ApiError> {
    let (gameplan, step_state) = state
        .services
        .steps
        .move_page(&id, request.from_index, request.to_index)
        .await?;
    Ok(Json(PlanAndStep {
        gameplan,
        step_state,
    }))
}

/// Live gameplan changes (SSE)
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/gameplan/stream",
    tag = "Gameplan",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Event stream of gameplan changes", body = String, content_type = "text/event-stream"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn stream(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.steps.gameplan(&id).await?;
    let payloads = state.services.gateway.watch(&id, Channel::Gameplan);
    Ok(payload_stream(payloads, state.keep_alive()))
}
