//! Switch control handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::BridgeState;
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct SwitchRequest {
    #[serde(default)]
    pub on: bool,
}

impl SwitchRequest {
    /// An empty body means "off".
    fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("invalid switch request: {}", e)))
    }
}

/// POST /api/device/:id/switch - Set the switch on or off
pub async fn set_switch(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    if state.registry.get(&id).is_none() {
        return Err(AppError::unknown_device());
    }
    let req = SwitchRequest::from_body(&body)?;

    state.controller.set_switch(&id, req.on).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/device/:id/toggle - Flip the switch
pub async fn toggle_switch(
    State(state): State<BridgeState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.controller.toggle_switch(&id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::api::test_support::{app, bridge, post, send};
    use crate::error::RpcError;
    use crate::shelly::testing::{FakeTransport, Reply};

    #[tokio::test]
    async fn test_switch_on() {
        let rpc = Arc::new(FakeTransport::new());
        rpc.script("http://10.0.0.5", vec![Reply::Ok(json!({"was_on": false}))]);

        let (status, body) = send(
            app(bridge(rpc.clone())),
            post("/api/device/a/switch", r#"{"on": true}"#),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"ok": true}));

        let calls = rpc.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "Switch.Set");
        assert_eq!(calls[0].2, json!({"id": 0, "on": true}));
    }

    #[tokio::test]
    async fn test_switch_empty_body_means_off() {
        let rpc = Arc::new(FakeTransport::new());
        rpc.script("http://10.0.0.5", vec![Reply::Ok(json!({"was_on": true}))]);

        let (status, _) = send(app(bridge(rpc.clone())), post("/api/device/a/switch", "")).await;
        assert_eq!(status, 200);
        assert_eq!(rpc.calls()[0].2, json!({"id": 0, "on": false}));
    }

    #[tokio::test]
    async fn test_switch_malformed_body() {
        let rpc = Arc::new(FakeTransport::new());
        let (status, body) = send(
            app(bridge(rpc.clone())),
            post("/api/device/a/switch", r#"{"on": "yes"}"#),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["ok"], false);
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_switch_rpc_failure_is_500() {
        let rpc = Arc::new(FakeTransport::new());
        rpc.script(
            "http://10.0.0.6",
            vec![Reply::Fail(RpcError::HttpStatus {
                method: "Switch.Set".to_string(),
                status: 502,
                body: String::new(),
            })],
        );

        let (status, body) = send(
            app(bridge(rpc)),
            post("/api/device/b/switch", r#"{"on": false}"#),
        )
        .await;
        assert_eq!(status, 500);
        assert_eq!(body, json!({"ok": false, "error": "Switch.Set failed: 502"}));
    }

    #[tokio::test]
    async fn test_toggle() {
        let rpc = Arc::new(FakeTransport::new());
        rpc.script("http://10.0.0.6", vec![Reply::Ok(json!({"was_on": false}))]);

        let (status, body) =
            send(app(bridge(rpc.clone())), post("/api/device/b/toggle", "")).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(rpc.calls()[0].0, "http://10.0.0.6");
        assert_eq!(rpc.calls()[0].1, "Switch.Toggle");
    }

    #[tokio::test]
    async fn test_toggle_transport_failure_is_500() {
        let rpc = Arc::new(FakeTransport::new());
        rpc.script("http://10.0.0.5", vec![Reply::timeout("Switch.Toggle")]);

        let (status, body) = send(app(bridge(rpc)), post("/api/device/a/toggle", "")).await;
        assert_eq!(status, 500);
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Switch.Toggle failed"));
    }

    #[tokio::test]
    async fn test_unknown_device_is_404_without_network() {
        let rpc = Arc::new(FakeTransport::new());

        let (status, body) =
            send(app(bridge(rpc.clone())), post("/api/device/zzz/toggle", "")).await;
        assert_eq!(status, 404);
        assert_eq!(body, json!({"ok": false, "error": "unknown device id"}));

        let (status, _) = send(
            app(bridge(rpc.clone())),
            post("/api/device/zzz/switch", "not json"),
        )
        .await;
        assert_eq!(status, 404);

        assert!(rpc.calls().is_empty());
    }
}
