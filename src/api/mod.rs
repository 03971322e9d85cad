//! API module - HTTP handlers and routes

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::control::DeviceController;
use crate::hub::BroadcastHub;
use crate::registry::DeviceRegistry;
use crate::state::StateStore;

/// Shared handler state
#[derive(Clone)]
pub struct BridgeState {
    pub registry: Arc<DeviceRegistry>,
    pub store: StateStore,
    pub hub: BroadcastHub,
    pub controller: Arc<DeviceController>,
}

pub fn routes(ws_path: &str) -> Router<BridgeState> {
    Router::new()
        // Service health
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Device state
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/device/:id/health", get(handlers::device_health))
        // Switch control
        .route("/api/device/:id/switch", post(handlers::set_switch))
        .route("/api/device/:id/toggle", post(handlers::toggle_switch))
        // Live updates
        .route(ws_path, get(handlers::ws_handler))
}
