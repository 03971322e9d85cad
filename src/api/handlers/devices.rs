//! Device state handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::api::BridgeState;
use crate::error::AppError;

/// GET /api/devices - All devices with their current state
pub async fn list_devices(State(state): State<BridgeState>) -> Json<Value> {
    let devices: Vec<Value> = state
        .store
        .views()
        .await
        .into_iter()
        .map(|view| {
            serde_json::json!({
                "id": view.id,
                "name": view.name,
                "baseUrl": view.base_url,
                "state": view,
            })
        })
        .collect();

    Json(serde_json::json!({
        "ok": true,
        "pollSec": state.hub.poll_sec(),
        "devices": devices,
    }))
}

/// GET /api/device/:id/health - One device's state
pub async fn device_health(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let device = state
        .store
        .view(&id)
        .await
        .ok_or_else(AppError::unknown_device)?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "device": device,
    })))
}
