//! Shelly HTTP-RPC client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::RpcError;

/// Maximum number of characters of an error body kept in `RpcError::HttpStatus`
const MAX_ERROR_BODY: usize = 512;

/// A single request/response call against a device's RPC endpoint.
///
/// No retries happen at this layer; callers decide the policy.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, base_url: &str, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// reqwest-backed RPC client. `POST {base_url}/rpc/{method}` with a JSON body.
#[derive(Clone)]
pub struct ShellyClient {
    http_client: Client,
    timeout: Duration,
}

impl ShellyClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    fn transport_error(&self, method: &str, e: reqwest::Error) -> RpcError {
        let message = if e.is_timeout() {
            format!("timed out after {}ms", self.timeout.as_millis())
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else if e.is_decode() {
            format!("invalid JSON response: {}", e)
        } else {
            e.to_string()
        };

        RpcError::Transport {
            method: method.to_string(),
            message,
        }
    }
}

#[async_trait]
impl RpcTransport for ShellyClient {
    async fn call(&self, base_url: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        let url = rpc_url(base_url, method);

        let resp = self
            .http_client
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::HttpStatus {
                method: method.to_string(),
                status: status.as_u16(),
                body: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| self.transport_error(method, e))
    }
}

fn rpc_url(base_url: &str, method: &str) -> String {
    format!("{}/rpc/{}", base_url, method)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
