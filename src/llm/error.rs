//! Errors surfaced by language-model backends.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum BackendError {
    #[error("API error{}: {message}", status_code.map(|c| format!(" ({c})")).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Authentication failed: {message}")]
    AuthenticationError { message: String },

    #[error("Request timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },

    #[error("Rate limit exceeded{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    RateLimitError { retry_after: Option<u64> },

    /// The model answered, but not with something usable.
    #[error("Invalid response from model: {message}")]
    InvalidResponse {
        message: String,
        raw_response: Option<String>,
    },

    /// Missing API keys, unknown providers and similar.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Error: {message}")]
    Other { message: String },
}

impl BackendError {
    /// Whether another attempt against the same backend may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::ApiError { status_code, .. } => {
                status_code.map(|code| code >= 500).unwrap_or(true)
            }
            BackendError::TimeoutError { .. }
            | BackendError::RateLimitError { .. }
            | BackendError::NetworkError { .. }
            | BackendError::InvalidResponse { .. } => true,
            BackendError::AuthenticationError { .. }
            | BackendError::ConfigurationError { .. }
            | BackendError::Other { .. } => false,
        }
    }
}
