//! Fake Shelly - single-switch device simulator
//!
//! Answers the Gen2/Gen3 RPC calls the bridge uses, so the bridge can be run
//! without hardware:
//!
//! ```text
//! FAKE_SHELLY__PORT=8081 cargo run --bin fake-shelly
//! SHELLY_DEVICES="fake|Fake Plug|http://127.0.0.1:8081" cargo run --bin shelly-bridge
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Deserialize)]
struct SimConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_mac")]
    mac: String,
}

fn default_port() -> u16 {
    8081
}

fn default_name() -> String {
    "FakeShelly1PM".to_string()
}

fn default_mac() -> String {
    "DEADBEEF0001".to_string()
}

impl SimConfig {
    fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("FAKE_SHELLY").separator("__"))
            .build()?;
        let mut config: SimConfig = settings.try_deserialize()?;
        config.mac = config.mac.to_uppercase();
        Ok(config)
    }
}

/// Simulated relay and meter
#[derive(Debug)]
struct Switch {
    output: bool,
    energy_wh: f64,
    last_sample: Instant,
    minute_ts: i64,
}

impl Switch {
    fn new(rng: &mut impl Rng, now: Instant, wall: DateTime<Utc>) -> Self {
        Self {
            output: false,
            energy_wh: 7000.0 + rng.gen_range(0.0..50.0),
            last_sample: now,
            minute_ts: wall.timestamp(),
        }
    }

    /// Take one reading. Energy accrues for the time since the previous one.
    fn sample(&mut self, rng: &mut impl Rng, now: Instant, wall: DateTime<Utc>) -> Value {
        let apower = if self.output {
            rng.gen_range(20.0..180.0)
        } else {
            rng.gen_range(0.0..1.2)
        };
        let voltage = rng.gen_range(228.0..241.0);
        let temp_c = if self.output {
            rng.gen_range(40.0..70.0)
        } else {
            rng.gen_range(25.0..40.0)
        };

        let elapsed = now.saturating_duration_since(self.last_sample).as_secs_f64();
        if self.output {
            self.energy_wh += apower * elapsed / 3600.0;
        }
        self.last_sample = now;

        let unixtime = wall.timestamp();
        if unixtime - self.minute_ts >= 60 {
            self.minute_ts = unixtime;
        }

        json!({
            "id": 0,
            "source": "fake",
            "output": self.output,
            "apower": round(apower, 1),
            "voltage": round(voltage, 1),
            "freq": 49.9,
            "current": round(apower / voltage, 3),
            "aenergy": {
                "total": round(self.energy_wh, 3),
                "by_minute": [0, 0, 0],
                "minute_ts": self.minute_ts,
            },
            "temperature": {
                "tC": round(temp_c, 1),
                "tF": round(temp_c * 9.0 / 5.0 + 32.0, 1),
            },
        })
    }
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

struct Simulator {
    name: String,
    mac: String,
    started: Instant,
    switch: Mutex<Switch>,
}

type SharedSimulator = Arc<Simulator>;

impl Simulator {
    fn new(name: String, mac: String) -> Self {
        let now = Instant::now();
        Self {
            name,
            mac,
            started: now,
            switch: Mutex::new(Switch::new(&mut rand::thread_rng(), now, Utc::now())),
        }
    }

    fn status(&self) -> Value {
        let now = Instant::now();
        let wall = Utc::now();
        let switch = {
            let mut switch = self.switch.lock().unwrap_or_else(PoisonError::into_inner);
            switch.sample(&mut rand::thread_rng(), now, wall)
        };

        json!({
            "ble": {},
            "cloud": { "connected": false },
            "mqtt": { "connected": false },
            "ws": { "connected": false },
            "switch:0": switch,
            "sys": {
                "mac": self.mac,
                "restart_required": false,
                "time": wall.format("%H:%M").to_string(),
                "unixtime": wall.timestamp(),
                "uptime": now.duration_since(self.started).as_secs(),
                "ram_size": 260000,
                "ram_free": 150000,
                "fs_size": 1048576,
                "fs_free": 700000,
                "cfg_rev": 1,
                "kvs_rev": 1,
                "schedule_rev": 0,
                "webhook_rev": 0,
                "available_updates": { "stable": { "version": "fake-1.0.0" } },
                "reset_reason": 0,
            },
            "wifi": {
                "sta_ip": "127.0.0.1",
                "status": "got ip",
                "ssid": "FAKE",
                "rssi": -40,
            },
            "name": self.name,
        })
    }

    /// Apply `update` to the relay and return the previous output.
    fn set_output(&self, update: impl FnOnce(bool) -> bool) -> bool {
        let mut switch = self.switch.lock().unwrap_or_else(PoisonError::into_inner);
        let was_on = switch.output;
        switch.output = update(was_on);
        was_on
    }
}

#[derive(Debug, Default, Deserialize)]
struct SetParams {
    #[serde(default)]
    on: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "ok": false, "error": message.into() }))).into_response()
}

async fn device_info(State(sim): State<SharedSimulator>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "device": sim.name,
        "mac": sim.mac,
        "rpc": true,
    }))
}

async fn get_status(State(sim): State<SharedSimulator>) -> Json<Value> {
    Json(sim.status())
}

async fn switch_set(State(sim): State<SharedSimulator>, body: Bytes) -> Response {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        SetParams::default()
    } else {
        match serde_json::from_slice::<SetParams>(&body) {
            Ok(params) => params,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)),
        }
    };

    let was_on = sim.set_output(|_| params.on);
    tracing::info!("[FakeShelly] Switch.Set on={} (was {})", params.on, was_on);
    Json(json!({ "was_on": was_on })).into_response()
}

async fn switch_toggle(State(sim): State<SharedSimulator>) -> Json<Value> {
    let was_on = sim.set_output(|on| !on);
    tracing::info!("[FakeShelly] Switch.Toggle on={}", !was_on);
    Json(json!({ "was_on": was_on }))
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn routes(sim: SharedSimulator) -> Router {
    Router::new()
        .route("/", get(device_info))
        .route("/rpc/Shelly.GetStatus", post(get_status))
        .route("/rpc/Switch.Set", post(switch_set))
        .route("/rpc/Switch.Toggle", post(switch_toggle))
        .fallback(not_found)
        .with_state(sim)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fake_shelly=info".into()),
        )
        .init();

    let config = SimConfig::load()?;
    let sim = Arc::new(Simulator::new(config.name.clone(), config.mac.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("[FakeShelly] {} ({}) listening on {}", config.name, config.mac, addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, routes(sim)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, http::Request};
    use rand::{rngs::StdRng, SeedableRng};
    use tower::ServiceExt;

    use super::*;

    fn simulator() -> SharedSimulator {
        Arc::new(Simulator::new("Test Plug".to_string(), "AABBCCDDEEFF".to_string()))
    }

    async fn call(sim: SharedSimulator, method: &str, uri: &str, body: &str) -> (u16, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = routes(sim).oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_sample_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        let start = Instant::now();
        let wall = Utc::now();
        let mut switch = Switch::new(&mut rng, start, wall);

        let off = switch.sample(&mut rng, start, wall);
        assert_eq!(off["output"], false);
        assert!(off["apower"].as_f64().unwrap() <= 1.2);
        let temp = off["temperature"]["tC"].as_f64().unwrap();
        assert!((25.0..=40.0).contains(&temp));

        switch.output = true;
        let on = switch.sample(&mut rng, start, wall);
        assert_eq!(on["output"], true);
        let apower = on["apower"].as_f64().unwrap();
        assert!((20.0..=180.0).contains(&apower));
        let voltage = on["voltage"].as_f64().unwrap();
        assert!((228.0..=241.0).contains(&voltage));
        let temp = on["temperature"]["tC"].as_f64().unwrap();
        assert_eq!(on["temperature"]["tF"], round(temp * 9.0 / 5.0 + 32.0, 1));
    }

    #[test]
    fn test_energy_accrues_only_while_on() {
        let mut rng = StdRng::seed_from_u64(1);
        let start = Instant::now();
        let wall = Utc::now();
        let mut switch = Switch::new(&mut rng, start, wall);
        let initial = switch.energy_wh;

        switch.sample(&mut rng, start + Duration::from_secs(600), wall);
        assert_eq!(switch.energy_wh, initial);

        switch.output = true;
        switch.sample(&mut rng, start + Duration::from_secs(4200), wall);
        // one hour at 20..180 W
        let gained = switch.energy_wh - initial;
        assert!((20.0..=180.0).contains(&gained), "gained {}", gained);
    }

    #[tokio::test]
    async fn test_device_info() {
        let (status, body) = call(simulator(), "GET", "/", "").await;
        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({"ok": true, "device": "Test Plug", "mac": "AABBCCDDEEFF", "rpc": true})
        );
    }

    #[tokio::test]
    async fn test_get_status_shape() {
        let (status, body) = call(simulator(), "POST", "/rpc/Shelly.GetStatus", "{}").await;
        assert_eq!(status, 200);
        assert_eq!(body["name"], "Test Plug");
        assert_eq!(body["sys"]["mac"], "AABBCCDDEEFF");
        assert_eq!(body["switch:0"]["id"], 0);
        assert!(body["switch:0"]["aenergy"]["total"].as_f64().unwrap() >= 7000.0);
        assert!(body["switch:0"]["temperature"]["tC"].is_number());
    }

    #[tokio::test]
    async fn test_switch_set_and_toggle() {
        let sim = simulator();

        let (status, body) =
            call(sim.clone(), "POST", "/rpc/Switch.Set", r#"{"id":0,"on":true}"#).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"was_on": false}));

        let (_, status_body) = call(sim.clone(), "POST", "/rpc/Shelly.GetStatus", "").await;
        assert_eq!(status_body["switch:0"]["output"], true);

        let (_, body) = call(sim.clone(), "POST", "/rpc/Switch.Toggle", r#"{"id":0}"#).await;
        assert_eq!(body, json!({"was_on": true}));

        let (_, body) = call(sim.clone(), "POST", "/rpc/Switch.Toggle", "").await;
        assert_eq!(body, json!({"was_on": false}));

        let (_, body) = call(sim, "POST", "/rpc/Switch.Set", "").await;
        assert_eq!(body, json!({"was_on": true}));
    }

    #[tokio::test]
    async fn test_bad_json_and_unknown_method() {
        let sim = simulator();

        let (status, body) = call(sim.clone(), "POST", "/rpc/Switch.Set", "{nope").await;
        assert_eq!(status, 400);
        assert_eq!(body["ok"], false);

        let (status, body) = call(sim, "POST", "/rpc/Cover.Open", "{}").await;
        assert_eq!(status, 404);
        assert_eq!(body, json!({"ok": false, "error": "Not found"}));
    }
}
