//! Configuration module
//!
//! Sources, lowest priority first:
//! 1. `config/default.{toml,yaml,json}` (optional)
//! 2. `SHELLY_BRIDGE__*` environment variables (`SHELLY_BRIDGE__POLL__INTERVAL_SECS=5`)
//! 3. Flat variables `PORT`, `WS_PATH`, `STATUS_POLL_SEC`, `SHELLY_DEVICES`

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::hub::DEFAULT_CAPACITY;
use crate::registry::DeviceRegistry;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub devices: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub refresh_after_command: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            refresh_after_command: true,
        }
    }
}

/// Accepted poll interval range.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

impl PollConfig {
    /// Poll interval, held within `MIN_INTERVAL..=MAX_INTERVAL`.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs)
            .unwrap_or_default()
            .clamp(MIN_INTERVAL, MAX_INTERVAL)
    }

    /// RPC timeout, kept below the poll interval.
    pub fn rpc_timeout(&self) -> Duration {
        let configured = Duration::from_millis(self.rpc_timeout_ms);
        let ceiling = self.interval() * 4 / 5;
        configured.min(ceiling)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_interval_secs() -> f64 {
    3.0
}

fn default_rpc_timeout_ms() -> u64 {
    2000
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_true() -> bool {
    true
}

/// Paths owned by the REST routes, or that the router would read as captures.
fn reserved_path(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    path.is_empty()
        || path == "/health"
        || path == "/api"
        || path.starts_with("/api/")
        || path.contains([':', '*'])
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("SHELLY_BRIDGE").separator("__"))
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .set_override_option("server.ws_path", std::env::var("WS_PATH").ok())?
            .set_override_option("poll.interval_secs", std::env::var("STATUS_POLL_SEC").ok())?
            .set_override_option("devices", std::env::var("SHELLY_DEVICES").ok())?
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = Duration::try_from_secs_f64(self.poll.interval_secs)
            .ok()
            .filter(|d| (MIN_INTERVAL..=MAX_INTERVAL).contains(d));
        if interval.is_none() {
            return Err(ConfigError::InvalidValue {
                key: "poll.interval_secs",
                reason: format!(
                    "must be between {} and {} seconds, got {}",
                    MIN_INTERVAL.as_secs_f64(),
                    MAX_INTERVAL.as_secs(),
                    self.poll.interval_secs
                ),
            });
        }
        if self.poll.rpc_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll.rpc_timeout_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "server.ws_path",
                reason: format!("must start with '/', got \"{}\"", self.server.ws_path),
            });
        }
        if reserved_path(&self.server.ws_path) {
            return Err(ConfigError::InvalidValue {
                key: "server.ws_path",
                reason: format!("\"{}\" collides with an API route", self.server.ws_path),
            });
        }
        if self.hub.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "hub.capacity",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Parse the configured device list.
    pub fn registry(&self) -> Result<DeviceRegistry, ConfigError> {
        match self.devices.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => DeviceRegistry::parse(raw),
            _ => Err(ConfigError::MissingDevices),
        }
    }
}
