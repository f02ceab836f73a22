//! Error types for the governance side.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

/// Session and decision-service errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Secret exchange rejected or failed.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// No credential yet; call `connect()` first.
    #[error("session is not connected")]
    NotConnected,

    /// Session has been torn down.
    #[error("session has been destroyed")]
    Destroyed,

    /// Decision service answered with a non-success status.
    #[error("governance API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Outbound call exceeded the fixed timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Issued credential violates lifetime bounds.
    #[error("invalid credential: {reason}")]
    InvalidCredential { reason: String },

    /// Response body did not have the expected shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl SessionError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "AUTHENTICATION_FAILED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Destroyed => "SESSION_DESTROYED",
            Self::Api { .. } => "API_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::InvalidCredential { .. } => "INVALID_CREDENTIAL",
            Self::InvalidResponse { .. } => "INVALID_RESPONSE",
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// A governed tool call was not allowed to proceed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tool '{tool}' denied: {reason}")]
pub struct ToolDenied {
    pub tool: String,
    pub reason: String,
    pub decision_id: String,
}

impl ToolDenied {
    pub const CODE: &'static str = "TOOL_DENIED";

    pub fn code(&self) -> &'static str {
        Self::CODE
    }
}

/// Errors surfaced by the proxy edge.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Backend could not be reached. Never retried.
    #[error("backend request failed: {0}")]
    Backend(#[source] reqwest::Error),

    /// Inbound body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),
}

impl ProxyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "BACKEND_UNAVAILABLE",
            Self::Body(_) => "BAD_REQUEST_BODY",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SessionError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(SessionError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!SessionError::Api {
            status: 403,
            message: String::new()
        }
        .is_retryable());
        assert!(!SessionError::Destroyed.is_retryable());
    }

    #[test]
    fn tool_denied_code_is_stable() {
        let denied = ToolDenied {
            tool: "send_email".into(),
            reason: "policy".into(),
            decision_id: "d-1".into(),
        };
        assert_eq!(denied.code(), "TOOL_DENIED");
        assert_eq!(denied.to_string(), "tool 'send_email' denied: policy");
    }
}
