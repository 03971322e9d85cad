//! Switch channel extraction from a `Shelly.GetStatus` reply

use serde_json::Value;

use crate::models::SwitchReading;

/// Key of a switch channel object in the status reply, e.g. `switch:0`.
pub fn channel_key(channel: u32) -> String {
    format!("switch:{}", channel)
}

/// Read one switch channel out of a status reply.
///
/// Missing or mistyped fields become `None`. A reply without the channel
/// object at all yields an all-`None` reading rather than an error.
pub fn read_switch(status: &Value, channel: u32) -> SwitchReading {
    let Some(sw) = status.get(channel_key(channel)) else {
        return SwitchReading::default();
    };

    SwitchReading {
        output: sw.get("output").and_then(Value::as_bool),
        apower: number(sw, "/apower"),
        voltage: number(sw, "/voltage"),
        current: number(sw, "/current"),
        energy_wh: number(sw, "/aenergy/total"),
        temperature_c: number(sw, "/temperature/tC"),
    }
}

fn number(sw: &Value, pointer: &str) -> Option<f64> {
    sw.pointer(pointer).and_then(Value::as_f64)
}
