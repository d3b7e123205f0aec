//! Upload handler: multipart stream into the library.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde_json::Map;

use super::{error_response, ActionResponse};
use crate::api::ApiState;
use crate::coordinator::CoordinatorError;

/// Accept a media file upload.
///
/// The first multipart field carrying a filename is streamed through an
/// upload sink; the sink enforces the size ceiling as bytes arrive and only
/// renames the file into place once the stream completes. Any failure or
/// client abort discards the partial, so a later listing or selection can
/// never resolve a half-written file.
pub async fn upload(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)> {
    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                return Err(error_response(CoordinatorError::UploadRejected(
                    "no file field in request".into(),
                )))
            }
            Err(e) => {
                return Err(error_response(CoordinatorError::UploadRejected(
                    e.to_string(),
                )))
            }
        };

        let Some(declared_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let mut sink = state
            .coordinator
            .begin_upload(&declared_name, None)
            .await
            .map_err(error_response)?;

        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = sink.write_chunk(&chunk).await {
                        sink.abort().await;
                        return Err(error_response(e));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Truncated or aborted transfer; never leave the partial.
                    sink.abort().await;
                    return Err(error_response(CoordinatorError::UploadRejected(
                        format!("transfer interrupted: {e}"),
                    )));
                }
            }
        }

        let receipt = sink.finish().await.map_err(error_response)?;

        let mut data = Map::new();
        data.insert("filename".into(), receipt.filename.clone().into());
        data.insert("size_bytes".into(), receipt.size_bytes.into());

        return Ok(ActionResponse::ok(
            format!("uploaded {}", receipt.filename),
            data,
        ));
    }
}
