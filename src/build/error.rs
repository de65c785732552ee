use std::time::Duration;
use thiserror::Error;

/// Failure of a single step, condition check or rollback action.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("path escapes the workspace: {0}")]
    PathEscape(String),

    #[error("command `{command}` exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Step(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packaging failed: {0}")]
    Packaging(String),
}

impl BuildError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BuildError::Timeout(_))
    }
}
