//! On-demand switch commands
//!
//! Commands go straight to the device, outside the poll cycle. The store is
//! never written here; when enabled, a successful command triggers an
//! out-of-cycle poll so the new switch state shows up right away.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::Device;
use crate::poller::Poller;
use crate::registry::DeviceRegistry;
use crate::shelly::{RpcTransport, METHOD_SWITCH_SET, METHOD_SWITCH_TOGGLE, SWITCH_CHANNEL};

pub struct DeviceController {
    registry: Arc<DeviceRegistry>,
    rpc: Arc<dyn RpcTransport>,
    refresh: Option<Arc<Poller>>,
}

impl DeviceController {
    pub fn new(registry: Arc<DeviceRegistry>, rpc: Arc<dyn RpcTransport>) -> Self {
        Self {
            registry,
            rpc,
            refresh: None,
        }
    }

    /// Re-poll the device through `poller` after every successful command.
    pub fn with_refresh(mut self, poller: Arc<Poller>) -> Self {
        self.refresh = Some(poller);
        self
    }

    pub async fn set_switch(&self, id: &str, on: bool) -> Result<(), AppError> {
        self.send(id, METHOD_SWITCH_SET, json!({ "id": SWITCH_CHANNEL, "on": on }))
            .await
    }

    pub async fn toggle_switch(&self, id: &str) -> Result<(), AppError> {
        self.send(id, METHOD_SWITCH_TOGGLE, json!({ "id": SWITCH_CHANNEL }))
            .await
    }

    async fn send(&self, id: &str, method: &str, params: Value) -> Result<(), AppError> {
        let device = self.registry.get(id).ok_or_else(AppError::unknown_device)?;

        if let Err(e) = self.rpc.call(&device.base_url, method, params).await {
            tracing::warn!("[Control] {} on {} ({}) failed: {}", method, device.id, device.name, e);
            return Err(e.into());
        }

        tracing::info!("[Control] {} on {} ({}) ok", method, device.id, device.name);
        self.schedule_refresh(device);
        Ok(())
    }

    fn schedule_refresh(&self, device: &Device) {
        let Some(poller) = self.refresh.clone() else {
            return;
        };
        let id = device.id.clone();
        tokio::spawn(async move {
            poller.refresh(&id).await;
        });
    }
}
