//! Library listing, which doubles as the file monitor's poll target.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use super::{error_response, ActionResponse};
use crate::api::ApiState;
use crate::library::LibraryEntry;

/// Library listing plus the aggregates monitors compare for change
/// detection (`count` and `last_modified` together act as the token).
#[derive(Serialize)]
pub struct FilesResponse {
    pub success: bool,

    pub files: Vec<LibraryEntry>,

    pub count: usize,

    /// Newest mtime across the library (unix seconds).
    pub last_modified: u64,

    pub total_size: u64,

    /// Server time of this listing (unix seconds).
    pub timestamp: u64,
}

/// List the library.
pub async fn list(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<FilesResponse>, (StatusCode, Json<ActionResponse>)> {
    let files = state
        .coordinator
        .library()
        .list()
        .await
        .map_err(|e| error_response(e.into()))?;

    let last_modified = files.iter().map(|f| f.modified_at).max().unwrap_or(0);
    let total_size = files.iter().map(|f| f.size_bytes).sum();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Ok(Json(FilesResponse {
        success: true,
        count: files.len(),
        last_modified,
        total_size,
        timestamp,
        files,
    }))
}
