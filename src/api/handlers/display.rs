//! Display reader poll target.

use std::sync::Arc;
use std::time::UNIX_EPOCH;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use super::{error_response, ActionResponse};
use crate::api::ApiState;
use crate::library::mime_type;

/// Current display state.
///
/// App-level staleness (nothing selected yet, or the selection names a
/// since-deleted file) is reported with `success=false` in a 200 body, so
/// pollers can distinguish it from transport failure: only the latter feeds
/// their offline counter.
#[derive(Serialize)]
pub struct DisplayResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Selected filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Change token readers compare against their last-seen value.
    pub token: u64,

    /// URL path the display fetches the bytes from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Media file mtime (unix seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,

    /// MIME type derived from the extension.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<&'static str>,
}

impl DisplayResponse {
    fn stale(token: u64, message: impl Into<String>) -> Self {
        DisplayResponse {
            success: false,
            message: Some(message.into()),
            filename: None,
            token,
            url: None,
            size: None,
            modified: None,
            media_type: None,
        }
    }
}

/// Current media information for display clients.
pub async fn current(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<DisplayResponse>, (StatusCode, Json<ActionResponse>)> {
    let record = state
        .coordinator
        .current_selection()
        .await
        .map_err(error_response)?;

    if record.is_empty() {
        return Ok(Json(DisplayResponse::stale(record.token, "nothing selected")));
    }

    // The record is written against a file that existed at selection time;
    // it may have been deleted since. Stale by design, surfaced here.
    let path = match state.coordinator.library().resolve(&record.filename) {
        Ok(path) => path,
        Err(_) => {
            return Ok(Json(DisplayResponse::stale(
                record.token,
                format!("media file not found: {}", record.filename),
            )));
        }
    };

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| error_response(e.into()))?;
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    Ok(Json(DisplayResponse {
        success: true,
        message: None,
        url: Some(format!("/media/{}", record.filename)),
        media_type: Some(mime_type(&record.filename)),
        size: Some(meta.len()),
        modified,
        token: record.token,
        filename: Some(record.filename),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_wire_field_names() {
        let body = DisplayResponse {
            success: true,
            message: None,
            filename: Some("clip.mp4".into()),
            token: 42,
            url: Some("/media/clip.mp4".into()),
            size: Some(7),
            modified: Some(1_700_000_000),
            media_type: Some("video/mp4"),
        };

        let json: serde_json::Value = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "video/mp4");
        assert!(json.get("media_type").is_none());
        assert_eq!(json["token"], 42);
    }

    #[test]
    fn stale_envelope_omits_media_fields() {
        let json = serde_json::to_value(DisplayResponse::stale(7, "nothing selected")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["token"], 7);
        assert!(json.get("url").is_none());
        assert!(json.get("type").is_none());
    }
}
