//! Error taxonomy shared by the session pipeline.

use crate::collaborators::CollaboratorError;
use crate::concepts::MappingError;
use crate::retrieval::RetrievalError;
use crate::vector::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("plan generation failed: {0}")]
    Generation(String),

    #[error("step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    #[error("step '{step}' depends on steps that did not succeed: {}", missing.join(", "))]
    DependencyUnmet { step: String, missing: Vec<String> },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("conceptual mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("system introspection failed: {0}")]
    Introspection(#[source] CollaboratorError),

    #[error("specification synthesis failed: {0}")]
    Synthesis(#[source] CollaboratorError),

    #[error("session cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Name recorded as `error_kind` on session log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Retrieval(_) => "RetrievalError",
            PipelineError::Generation(_) => "GenerationError",
            PipelineError::StepExecution { .. } => "StepExecutionError",
            PipelineError::DependencyUnmet { .. } => "DependencyUnmetError",
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::Rollback(_) => "RollbackError",
            PipelineError::SessionNotFound(_) => "SessionNotFoundError",
            PipelineError::InvalidSessionState(_) => "InvalidSessionStateError",
            PipelineError::Store(_) => "StoreError",
            PipelineError::Mapping(_) => "MappingError",
            PipelineError::Introspection(_) => "IntrospectionError",
            PipelineError::Synthesis(_) => "SynthesisError",
            PipelineError::Cancelled => "CancelledError",
            PipelineError::Io(_) => "IoError",
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        PipelineError::InvalidSessionState(message.into())
    }
}
