use crate::llm::BackendError;
use std::time::Duration;
use thiserror::Error;

/// Failure of an external capability (embedding, generation, analysis).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{collaborator} is unavailable: {message}")]
    Unavailable {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} timed out after {elapsed:?}")]
    Timeout {
        collaborator: String,
        elapsed: Duration,
    },

    #[error("invalid response from {collaborator}: {message}")]
    InvalidResponse {
        collaborator: String,
        message: String,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Failed(String),
}

impl CollaboratorError {
    pub fn invalid_response(collaborator: &str, message: impl Into<String>) -> Self {
        CollaboratorError::InvalidResponse {
            collaborator: collaborator.to_string(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CollaboratorError::Unavailable { .. }
            | CollaboratorError::Timeout { .. }
            | CollaboratorError::InvalidResponse { .. }
            | CollaboratorError::Http(_) => true,
            CollaboratorError::Backend(e) => e.is_retryable(),
            CollaboratorError::Configuration(_) | CollaboratorError::Failed(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(CollaboratorError::Timeout {
            collaborator: "gen".into(),
            elapsed: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!CollaboratorError::Configuration("no model".into()).is_retryable());
        assert!(!CollaboratorError::Backend(BackendError::AuthenticationError {
            message: "bad key".into()
        })
        .is_retryable());
    }
}
