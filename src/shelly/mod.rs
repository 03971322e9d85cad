//! Shelly Gen2/Gen3 HTTP-RPC integration
//!
//! - `client`: transport trait and the reqwest-backed client
//! - `status`: switch channel extraction from `Shelly.GetStatus`

pub mod client;
pub mod status;

#[cfg(test)]
pub mod testing;

pub use client::{RpcTransport, ShellyClient};

pub const METHOD_GET_STATUS: &str = "Shelly.GetStatus";
pub const METHOD_SWITCH_SET: &str = "Switch.Set";
pub const METHOD_SWITCH_TOGGLE: &str = "Switch.Toggle";

/// Channel index used for all switch operations.
pub const SWITCH_CHANNEL: u32 = 0;
