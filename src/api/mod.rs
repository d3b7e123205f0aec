//! REST API for the marquee daemon.
//!
//! Provides HTTP endpoints for:
//! - Control operations (select, presets, delete, upload)
//! - Reader poll targets (current display state, library listing)
//! - Health checks
//!
//! Display clients and admin views are plain pollers of the GET endpoints;
//! there is no push channel.

pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;

/// Shared state for API handlers.
pub struct ApiState {
    /// The coordinator owning all store mutations.
    pub coordinator: Arc<Coordinator>,
}

impl ApiState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

/// Build the API router with all routes.
pub fn router(state: Arc<ApiState>) -> Router {
    // CORS configuration - displays are typically served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Uploads may exceed axum's default body limit by design; the
    // coordinator enforces the real ceiling while streaming.
    let body_limit = state.coordinator.upload_limit() as usize + 1024 * 1024;

    let media_dir = state.coordinator.library().root().to_path_buf();

    Router::new()
        // Status/health
        .route("/api/v1/status", get(handlers::status::health))
        // Reader poll targets
        .route("/api/v1/display", get(handlers::display::current))
        .route("/api/v1/files", get(handlers::files::list))
        // Control operations
        .route("/api/v1/select", post(handlers::control::select))
        .route(
            "/api/v1/presets",
            get(handlers::control::get_presets).put(handlers::control::update_presets),
        )
        .route(
            "/api/v1/presets/:slot/activate",
            post(handlers::control::activate_preset),
        )
        .route("/api/v1/files/:name", delete(handlers::control::delete_file))
        .route("/api/v1/upload", post(handlers::upload::upload))
        // Raw media bytes for display clients
        .nest_service("/media", ServeDir::new(media_dir))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(())
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        if !status.is_success() {
                            tracing::warn!(
                                status = %status,
                                latency_ms = latency.as_millis(),
                                "request failed"
                            );
                        }
                    },
                ),
        )
        .with_state(state)
}

/// Start the API server.
pub async fn serve(state: Arc<ApiState>, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!("marquee API listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
