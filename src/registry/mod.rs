//! Device registry: the static list of devices to bridge.
//!
//! Entries use the `id|name|baseUrl` form, separated by commas:
//! `kitchen|Kitchen|http://192.168.1.50,boiler|Boiler|http://192.168.1.51`

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::models::Device;

/// Parse a registry string into devices.
///
/// Fields are trimmed, one trailing slash is stripped from the base URL and
/// an empty name falls back to the id. Blank entries are skipped.
pub fn parse_devices(raw: &str) -> Result<Vec<Device>, ConfigError> {
    let mut devices = Vec::new();
    let mut seen = HashSet::new();

    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
        let &[id, name, base_url] = parts.as_slice() else {
            return Err(ConfigError::MalformedEntry {
                entry: entry.to_string(),
            });
        };

        if id.is_empty() || base_url.is_empty() {
            return Err(ConfigError::MissingField {
                entry: entry.to_string(),
            });
        }

        if !seen.insert(id.to_string()) {
            return Err(ConfigError::DuplicateId(id.to_string()));
        }

        let base_url = base_url.strip_suffix('/').unwrap_or(base_url);
        let name = if name.is_empty() { id } else { name };

        devices.push(Device {
            id: id.to_string(),
            name: name.to_string(),
            base_url: base_url.to_string(),
        });
    }

    Ok(devices)
}

/// Immutable, ordered set of registered devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        parse_devices(raw).map(|devices| Self { devices })
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }
}
