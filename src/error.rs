use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_UNAVAILABLE: &str = "UNAVAILABLE";
pub const CODE_INVALID_ARGUMENTS: &str = "INVALID_ARGUMENTS";
pub const CODE_PLATFORM_ERROR: &str = "PLATFORM_ERROR";
pub const CODE_DELIVERY_FAILED: &str = "DELIVERY_FAILED";
pub const CODE_CONFIG_ERROR: &str = "CONFIG_ERROR";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Event delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Stable code carried across the channel boundary.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Unavailable(_) => CODE_UNAVAILABLE,
            BridgeError::InvalidArguments(_) => CODE_INVALID_ARGUMENTS,
            BridgeError::Platform(_) => CODE_PLATFORM_ERROR,
            BridgeError::Delivery(_) => CODE_DELIVERY_FAILED,
            BridgeError::Config(_) => CODE_CONFIG_ERROR,
        }
    }

    pub fn to_detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code().to_string(),
            message: self.to_string(),
            details: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Structured failure record, the error half of a method result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code.as_str() {
            CODE_INVALID_ARGUMENTS | CODE_CONFIG_ERROR => StatusCode::BAD_REQUEST,
            CODE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            CODE_DELIVERY_FAILED => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorDetail {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorResponse { error: self })).into_response()
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Platform(err.to_string())
    }
}
