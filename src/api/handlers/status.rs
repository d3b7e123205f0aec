//! Status and health check handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::ApiState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,

    /// Crate version.
    pub version: &'static str,

    /// Number of selectable library files.
    pub file_count: usize,

    /// Currently selected filename, if any.
    pub selection: Option<String>,

    /// Current change token.
    pub token: u64,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let file_count = state
        .coordinator
        .library()
        .list()
        .await
        .map(|files| files.len())
        .unwrap_or(0);

    let record = state
        .coordinator
        .current_selection()
        .await
        .unwrap_or_default();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        file_count,
        selection: (!record.is_empty()).then_some(record.filename),
        token: record.token,
    })
}
