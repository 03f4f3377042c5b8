// Error types for throne-proxy
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on how much of an upstream error body is carried in an error.
pub const UPSTREAM_BODY_SNIPPET_CHARS: usize = 512;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// Bad or missing endpoint, credential or profile table.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A single upstream attempt ran out of time.
    #[error("Upstream timed out after {elapsed:?}")]
    UpstreamTimeout { elapsed: Duration },

    /// The overall retry deadline was crossed.
    #[error("Upstream retry budget of {budget:?} exceeded after {attempts} attempt(s)")]
    UpstreamBudgetExceeded { budget: Duration, attempts: u32 },

    #[error("Upstream returned HTTP {status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("Upstream network error: {0}")]
    Network(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Stream transport error: {0}")]
    StreamTransport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Build an `UpstreamHttp` error, keeping only a bounded snippet of the body.
    pub fn upstream_http(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(UPSTREAM_BODY_SNIPPET_CHARS).collect();
        ProxyError::UpstreamHttp {
            status,
            body: snippet,
        }
    }

    /// Anthropic error `type` string for this error.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::Configuration(_) | ProxyError::ConfigParsing(_) => "configuration_error",
            ProxyError::InvalidRequest(_) | ProxyError::Json(_) => "invalid_request_error",
            ProxyError::UpstreamTimeout { .. } => "timeout_error",
            ProxyError::UpstreamBudgetExceeded { .. } => "budget_exceeded_error",
            ProxyError::UpstreamHttp { status, .. } => match status {
                400 => "invalid_request_error",
                401 => "authentication_error",
                403 => "permission_error",
                404 => "not_found_error",
                413 => "request_too_large",
                429 => "rate_limit_error",
                529 => "overloaded_error",
                _ => "api_error",
            },
            ProxyError::Translation(_) => "translation_error",
            _ => "api_error",
        }
    }

    /// HTTP status the error maps to when no response has been started yet.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Configuration(_) | ProxyError::ConfigParsing(_) => StatusCode::BAD_REQUEST,
            ProxyError::InvalidRequest(_) | ProxyError::Json(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamTimeout { .. } | ProxyError::UpstreamBudgetExceeded { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ProxyError::UpstreamHttp { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::Network(_) | ProxyError::MalformedResponse(_) | ProxyError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Convert ProxyError to HTTP responses for Axum
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "type": "error",
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
