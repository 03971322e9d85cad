//! Error handling module

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Startup configuration errors. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid device entry: \"{entry}\". Expected: id|name|baseUrl")]
    MalformedEntry { entry: String },

    #[error("Invalid device entry: \"{entry}\". id and baseUrl required.")]
    MissingField { entry: String },

    #[error("Duplicate device id: \"{0}\"")]
    DuplicateId(String),

    #[error("No devices configured (set SHELLY_DEVICES, e.g. kitchen|Kitchen|http://192.168.1.50)")]
    MissingDevices,

    #[error("Invalid setting {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Failure of a single device RPC call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("{method} failed: {message}")]
    Transport { method: String, message: String },

    #[error("{method} failed: {status}{}", body_suffix(.body))]
    HttpStatus {
        method: String,
        status: u16,
        body: String,
    },
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" {}", body)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl AppError {
    pub fn unknown_device() -> Self {
        AppError::NotFound("unknown device id".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rpc(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "ok": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
