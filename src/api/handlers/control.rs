//! Control operation handlers: select, presets, delete.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{error_response, ActionResponse};
use crate::api::ApiState;
use crate::store::PresetMap;

/// Select request body.
#[derive(Deserialize)]
pub struct SelectRequest {
    /// Filename inside the library.
    pub filename: String,

    /// Optional timestamp hint (unix milliseconds) for the change token.
    pub timestamp: Option<u64>,
}

/// Select a file for display.
pub async fn select(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SelectRequest>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)> {
    let record = state
        .coordinator
        .select_file(&request.filename, request.timestamp)
        .await
        .map_err(error_response)?;

    let mut data = Map::new();
    data.insert("filename".into(), record.filename.clone().into());
    data.insert("token".into(), record.token.into());

    Ok(ActionResponse::ok(
        format!("now displaying {}", record.filename),
        data,
    ))
}

/// Activate a preset slot.
pub async fn activate_preset(
    State(state): State<Arc<ApiState>>,
    Path(slot): Path<String>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)> {
    let record = state
        .coordinator
        .activate_preset(&slot)
        .await
        .map_err(error_response)?;

    let mut data = Map::new();
    data.insert("slot".into(), slot.into());
    data.insert("filename".into(), record.filename.clone().into());
    data.insert("token".into(), record.token.into());

    Ok(ActionResponse::ok(
        format!("now displaying {}", record.filename),
        data,
    ))
}

/// Preset map response.
#[derive(Serialize)]
pub struct PresetsResponse {
    /// Library base path stored with the presets.
    pub base_path: String,

    /// Slot name to filename.
    pub slots: BTreeMap<String, String>,
}

impl From<PresetMap> for PresetsResponse {
    fn from(map: PresetMap) -> Self {
        PresetsResponse {
            base_path: map.base_path.clone(),
            slots: map
                .slots()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Read the current preset map.
pub async fn get_presets(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<PresetsResponse>, (StatusCode, Json<ActionResponse>)> {
    let map = state
        .coordinator
        .current_presets()
        .await
        .map_err(error_response)?;

    Ok(Json(map.into()))
}

/// Replace the preset map from an arbitrary field set.
///
/// Full replace, not a merge: slots omitted here are dropped.
pub async fn update_presets(
    State(state): State<Arc<ApiState>>,
    Json(fields): Json<BTreeMap<String, String>>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)> {
    let map = state
        .coordinator
        .update_presets(&fields)
        .await
        .map_err(error_response)?;

    let mut data = Map::new();
    data.insert("slots".into(), Value::from(map.len()));

    Ok(ActionResponse::ok("presets updated", data))
}

/// Delete a library file.
pub async fn delete_file(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)> {
    state
        .coordinator
        .delete_file(&name)
        .await
        .map_err(error_response)?;

    let mut data = Map::new();
    data.insert("filename".into(), name.clone().into());

    Ok(ActionResponse::ok(format!("deleted {name}"), data))
}
