//! REST API for waypoint sessions.
//!
//! Visitor-facing calls (session create, step increment, checkpoint open and
//! watch) and operator-facing calls (status, redirects, reorder, resolve)
//! share one router. Live row changes are served as SSE streams.

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod sse;
pub mod state;

pub use openapi::ApiDoc;
pub use server::{RestApiServer, RestApiStatus};
pub use state::ApiState;

/// Default port for the REST API server
pub const DEFAULT_PORT: u16 = 7410;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Settings
        .route(
            "/api/v1/settings",
            get(routes::settings::get_settings).put(routes::settings::update_settings),
        )
        // Session endpoints
        .route(
            "/api/v1/sessions",
            get(routes::sessions::list).post(routes::sessions::create),
        )
        .route("/api/v1/sessions/:id", get(routes::sessions::get_one))
        .route("/api/v1/sessions/:id/status", put(routes::sessions::set_status))
        .route("/api/v1/sessions/:id/stream", get(routes::sessions::stream))
        // Step endpoints
        .route(
            "/api/v1/sessions/:id/step",
            get(routes::steps::get_one).put(routes::steps::set),
        )
        .route(
            "/api/v1/sessions/:id/step/increment",
            post(routes::steps::increment),
        )
        .route(
            "/api/v1/sessions/:id/step/force-wait",
            put(routes::steps::force_wait),
        )
        .route("/api/v1/sessions/:id/step/stream", get(routes::steps::stream))
        // Gameplan endpoints
        .route(
            "/api/v1/sessions/:id/gameplan",
            get(routes::gameplan::get_one).put(routes::gameplan::set_pages),
        )
        .route(
            "/api/v1/sessions/:id/gameplan/pages",
            post(routes::gameplan::append_page),
        )
        .route(
            "/api/v1/sessions/:id/gameplan/redirect",
            post(routes::gameplan::redirect),
        )
        .route(
            "/api/v1/sessions/:id/gameplan/reorder",
            post(routes::gameplan::reorder),
        )
        .route(
            "/api/v1/sessions/:id/gameplan/stream",
            get(routes::gameplan::stream),
        )
        // Event log endpoints
        .route(
            "/api/v1/sessions/:id/events",
            get(routes::events::list).post(routes::events::add),
        )
        .route(
            "/api/v1/sessions/:id/events/stream",
            get(routes::events::stream),
        )
        // Checkpoint endpoints
        .route(
            "/api/v1/sessions/:id/checkpoints",
            get(routes::checkpoints::list_waiting).post(routes::checkpoints::open),
        )
        .route(
            "/api/v1/sessions/:id/checkpoints/waiting",
            get(routes::checkpoints::waiting),
        )
        .route(
            "/api/v1/sessions/:id/checkpoints/latest",
            get(routes::checkpoints::latest),
        )
        .route(
            "/api/v1/sessions/:id/checkpoints/resolve",
            post(routes::checkpoints::resolve),
        )
        .route(
            "/api/v1/sessions/:id/checkpoints/clear-stale",
            post(routes::checkpoints::clear_stale),
        )
        .route(
            "/api/v1/sessions/:id/checkpoints/stream",
            get(routes::checkpoints::stream),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the REST API server until Ctrl-C
pub async fn serve(state: ApiState) -> Result<()> {
    let server = RestApiServer::new(state);
    server.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
    server.stop().await;
    Ok(())
}
