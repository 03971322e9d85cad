//! HTTP handlers module

mod control;
mod devices;
mod ws;

pub use self::control::*;
pub use self::devices::*;
pub use self::ws::*;

use axum::{extract::State, Json};
use serde::Serialize;

use super::BridgeState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub devices: usize,
    pub subscribers: usize,
}

/// Health check handler
pub async fn health_check(State(state): State<BridgeState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: "shelly-bridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        devices: state.registry.len(),
        subscribers: state.hub.subscriber_count(),
    })
}
