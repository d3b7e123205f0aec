//! HTTP request handlers.

pub mod control;
pub mod display;
pub mod files;
pub mod status;
pub mod upload;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::coordinator::CoordinatorError;

/// Uniform result envelope for control operations.
///
/// `success` and `error` are the authoritative fields; `message` is for
/// humans and must never be parsed for control flow.
#[derive(Serialize)]
pub struct ActionResponse {
    pub success: bool,

    pub message: String,

    /// Stable error code, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,

    /// Operation-specific payload, empty on failure.
    pub data: Map<String, Value>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>, data: Map<String, Value>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            error: None,
            data,
        })
    }
}

/// Map a coordinator failure to an HTTP status plus the envelope.
pub fn error_response(e: CoordinatorError) -> (StatusCode, Json<ActionResponse>) {
    let status = match &e {
        CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
        CoordinatorError::InvalidPreset(_) => StatusCode::BAD_REQUEST,
        CoordinatorError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoordinatorError::UploadRejected(_) => StatusCode::BAD_REQUEST,
        CoordinatorError::ConfigCorrupt(_)
        | CoordinatorError::Corrupt(_)
        | CoordinatorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %e, "coordinator operation failed");
    }

    (
        status,
        Json(ActionResponse {
            success: false,
            message: e.to_string(),
            error: Some(e.code()),
            data: Map::new(),
        }),
    )
}
