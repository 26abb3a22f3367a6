//! Session endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::bus::Channel;
use crate::rest::dto::{CreateSessionRequest, CreateSessionResponse, ListSessionsQuery, SetStatusRequest};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::sse::payload_stream;
use crate::rest::state::ApiState;
use crate::sessions::CreateOutcome;
use crate::types::{Session, SessionId, SessionOrigin, SessionStatus};

fn parse_status(raw: &str) -> Result<SessionStatus, ApiError> {
    raw.parse().map_err(ApiError::ValidationError)
}

/// Create a session for a visitor, or reuse the open one from the same address
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 200, description = "Existing session reused, creation closed, or store offline", body = CreateSessionResponse)
    )
)]
pub async fn create(
    State(state): State<ApiState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let origin = SessionOrigin {
        address: request.address,
        client_signature: request.client_signature,
    };
    let outcome = state.services.sessions.create(origin).await?;
    let code = match outcome {
        CreateOutcome::Created(_) => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((code, Json(CreateSessionResponse::from(outcome))))
}

/// Get a session by id
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session", body = Session),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.services.sessions.get(&id).await?))
}

/// List sessions, newest first, optionally filtered by status
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    params(ListSessionsQuery),
    responses(
        (status = 200, description = "Sessions", body = Vec<Session>),
        (status = 400, description = "Unknown status", body = ErrorResponse)
    )
)]
pub async fn list(
    State(state): State<ApiState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = &state.services.sessions;
    let list = match query.status.as_deref() {
        Some(raw) => sessions.list_by_status(parse_status(raw)?).await?,
        None => {
            let mut all = Vec::new();
            for status in SessionStatus::ALL {
                all.extend(sessions.list_by_status(status).await?);
            }
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            all
        }
    };
    Ok(Json(list))
}

/// Operator status change
#[utoipa::path(
    put,
    path = "/api/v1/sessions/{id}/status",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Updated session", body = Session),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    )
)]
pub async fn set_status(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<Session>, ApiError> {
    let status = parse_status(&request.status)?;
    let session = state
        .services
        .sessions
        .set_status(&id, status, request.operator_id)
        .await?;
    Ok(Json(session))
}

/// Live session row changes (SSE)
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/stream",
    tag = "Sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Event stream of session changes", body = String, content_type = "text/event-stream"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn stream(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.sessions.get(&id).await?;
    let payloads = state.services.gateway.watch(&id, Channel::Session);
    Ok(payload_stream(payloads, state.keep_alive()))
}
