//! Health check and status endpoints.

use axum::{extract::State, Json};

use crate::rest::dto::{HealthResponse, StatusResponse};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get service status with session counts
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "Health",
    responses(
        (status = 200, description = "Service status with session counts", body = StatusResponse),
        (status = 503, description = "Record store unreachable", body = ErrorResponse)
    )
)]
pub async fn status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let sessions = &state.services.sessions;
    let counts = sessions.counts().await?;
    let settings = sessions.settings().await;

    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        allow_new_sessions: settings.allow_new_sessions,
        sessions: counts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::SessionOrigin;

    #[tokio::test]
    async fn test_health() {
        let resp = health().await;
        assert_eq!(resp.status, "ok");
        assert!(!resp.version.is_empty());
    }

    #[tokio::test]
    async fn test_status_counts_sessions() {
        let state = ApiState::in_memory(Config::default());
        state
            .services
            .sessions
            .create(SessionOrigin::default())
            .await
            .unwrap();

        let resp = status(State(state)).await.unwrap();
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.sessions.pending, 1);
        assert!(resp.allow_new_sessions);
    }
}
