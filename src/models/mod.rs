//! Data models for shelly-bridge

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Device Models
// ============================================================================

/// A registered device. Loaded once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub base_url: String,
}

/// The six values read from one switch channel of a `Shelly.GetStatus` reply.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SwitchReading {
    pub output: Option<bool>,
    pub apower: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub energy_wh: Option<f64>,
    pub temperature_c: Option<f64>,
}

/// Last-known switch telemetry for a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchMetrics {
    pub output: Option<bool>,
    pub apower: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub energy_wh: Option<f64>,
    pub temperature_c: Option<f64>,
    /// Epoch millis of the last successful poll
    pub last_update_ts: Option<i64>,
}

impl SwitchMetrics {
    /// Overwrite every reading field at once and stamp the update time.
    pub fn apply(&mut self, reading: SwitchReading, now_ms: i64) {
        self.output = reading.output;
        self.apower = reading.apower;
        self.voltage = reading.voltage;
        self.current = reading.current;
        self.energy_wh = reading.energy_wh;
        self.temperature_c = reading.temperature_c;
        self.last_update_ts = Some(now_ms);
    }
}

/// Connection status plus metrics for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub connected: bool,
    pub last_error: Option<String>,
    pub metrics: SwitchMetrics,
}

/// Device identity together with its current state, as served to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(flatten)]
    pub state: DeviceState,
}

impl DeviceView {
    pub fn new(device: &Device, state: DeviceState) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            base_url: device.base_url.clone(),
            state,
        }
    }
}

/// Full store contents sent to a newly connected subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub poll_sec: f64,
    pub devices: BTreeMap<String, DeviceView>,
}

// ============================================================================
// Broadcast Events
// ============================================================================

/// Messages pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    Snapshot {
        state: Snapshot,
    },
    DeviceUpdate {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "deviceName")]
        device_name: String,
        metrics: SwitchMetrics,
    },
    DeviceError {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "deviceName")]
        device_name: String,
        error: String,
    },
}

impl HubEvent {
    pub fn update(device: &Device, metrics: SwitchMetrics) -> Self {
        HubEvent::DeviceUpdate {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            metrics,
        }
    }

    pub fn error(device: &Device, error: impl Into<String>) -> Self {
        HubEvent::DeviceError {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kitchen() -> Device {
        Device {
            id: "a".to_string(),
            name: "Kitchen".to_string(),
            base_url: "http://10.0.0.5".to_string(),
        }
    }

    #[test]
    fn test_empty_state_serializes_nulls() {
        let view = DeviceView::new(&kitchen(), DeviceState::default());
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "id": "a",
                "name": "Kitchen",
                "baseUrl": "http://10.0.0.5",
                "connected": false,
                "lastError": null,
                "metrics": {
                    "output": null,
                    "apower": null,
                    "voltage": null,
                    "current": null,
                    "energyWh": null,
                    "temperatureC": null,
                    "lastUpdateTs": null
                }
            })
        );
    }

    #[test]
    fn test_metrics_apply_overwrites_everything() {
        let mut metrics = SwitchMetrics {
            output: Some(true),
            apower: Some(10.0),
            voltage: Some(230.0),
            current: Some(0.1),
            energy_wh: Some(5.0),
            temperature_c: Some(40.0),
            last_update_ts: Some(1),
        };
        metrics.apply(
            SwitchReading {
                apower: Some(42.5),
                ..Default::default()
            },
            99,
        );
        assert_eq!(metrics.output, None);
        assert_eq!(metrics.apower, Some(42.5));
        assert_eq!(metrics.voltage, None);
        assert_eq!(metrics.temperature_c, None);
        assert_eq!(metrics.last_update_ts, Some(99));
    }

    #[test]
    fn test_event_wire_format() {
        let event = HubEvent::error(&kitchen(), "Shelly.GetStatus failed: timed out");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "device_error",
                "deviceId": "a",
                "deviceName": "Kitchen",
                "error": "Shelly.GetStatus failed: timed out"
            })
        );

        let event = HubEvent::update(&kitchen(), SwitchMetrics::default());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "device_update");
        assert_eq!(value["deviceName"], "Kitchen");
        assert!(value["metrics"]["apower"].is_null());
    }
}
