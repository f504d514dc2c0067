//! Error types for the Claude API client.

use serde::Deserialize;
use thiserror::Error;

/// Errors from the Claude API client.
#[derive(Debug, Error)]
pub enum ClaudeError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse a response or stream event.
    #[error("parse error: {0}")]
    Parse(String),

    /// The byte stream failed mid-response.
    #[error("stream error: {0}")]
    Stream(String),

    /// Rate limited; retry after the given number of seconds.
    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Invalid API key.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Typed error returned by the API.
    #[error("API error ({error_type}): {message}")]
    Api {
        error_type: String,
        message: String,
    },
}

/// Error response body from the Anthropic API.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}
