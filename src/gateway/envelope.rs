//! The common response envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Envelope wrapping every non-streaming response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Operation payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Machine-readable error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Extra failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Response timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ApiResponse {
    /// A success envelope with payload.
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            message: "ok".to_string(),
            data: serde_json::to_value(data).ok(),
            error_code: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// A success envelope with a custom message.
    pub fn ok_with_message(message: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            message: message.into(),
            ..Self::ok(data)
        }
    }

    /// A failure envelope that still ships a payload (safety rejections).
    pub fn rejected(message: impl Into<String>, code: &str, data: impl Serialize) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: serde_json::to_value(data).ok(),
            error_code: Some(code.to_string()),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// A failure envelope.
    pub fn error(message: impl Into<String>, code: &str, details: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: Some(code.to_string()),
            details,
            timestamp: Utc::now(),
        }
    }
}
