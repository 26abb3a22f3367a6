//! Session event log endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::bus::Channel;
use crate::error::require_label;
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::sse::payload_stream;
use crate::rest::state::ApiState;
use crate::types::{Event, EventBody, SessionId};

/// Checkpoint records are only written through the checkpoint endpoints
fn validate_body(body: &EventBody) -> Result<(), ApiError> {
    match body {
        EventBody::Input { title, .. } | EventBody::Interaction { title } => {
            require_label("title", title)?;
        }
        EventBody::Marker { note } => require_label("note", note)?,
        EventBody::Checkpoint { .. } => {
            return Err(ApiError::ValidationError(
                "checkpoint records are managed through /checkpoints".to_string(),
            ));
        }
    }
    Ok(())
}

/// List the session's events in insertion order
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/events",
    tag = "Events",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Events", body = Vec<Event>),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn list(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<Event>>, ApiError> {
    state.services.sessions.get(&id).await?;
    Ok(Json(state.services.gateway.events(&id).await?))
}

/// Append an input, interaction or marker event
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/events",
    tag = "Events",
    params(("id" = String, Path, description = "Session id")),
    request_body = EventBody,
    responses(
        (status = 201, description = "Event recorded", body = Event),
        (status = 400, description = "Blank label or checkpoint body", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn add(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
    Json(body): Json<EventBody>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    validate_body(&body)?;
    let event = state.services.gateway.insert_event(&id, body).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Live event inserts and updates (SSE)
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/events/stream",
    tag = "Events",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Event stream of event-log changes", body = String, content_type = "text/event-stream"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn stream(
    State(state): State<ApiState>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.sessions.get(&id).await?;
    let payloads = state.services.gateway.watch(&id, Channel::Events);
    Ok(payload_stream(payloads, state.keep_alive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_bodies_rejected() {
        let err = validate_body(&EventBody::waiting("Code check")).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[test]
    fn test_blank_title_rejected() {
        assert!(validate_body(&EventBody::interaction(" ")).is_err());
        assert!(validate_body(&EventBody::input("Name", "")).is_ok());
    }
}
