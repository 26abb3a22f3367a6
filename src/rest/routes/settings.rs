//! Runtime session-creation settings.

use axum::{extract::State, Json};

use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::sessions::{SessionSettings, SettingsUpdate};

/// Current creation policy
#[utoipa::path(
    get,
    path = "/api/v1/settings",
    tag = "Settings",
    responses(
        (status = 200, description = "Session settings", body = SessionSettings)
    )
)]
pub async fn get_settings(State(state): State<ApiState>) -> Json<SessionSettings> {
    Json(state.services.sessions.settings().await)
}

/// Toggle new-session creation or replace the default page sequence
#[utoipa::path(
    put,
    path = "/api/v1/settings",
    tag = "Settings",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Updated settings", body = SessionSettings),
        (status = 400, description = "Empty page sequence or blank page name", body = ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<ApiState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SessionSettings>, ApiError> {
    Ok(Json(state.services.sessions.update_settings(update).await?))
}
