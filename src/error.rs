//! Error types for the document pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {

    // =============================
    // Collaborator Faults
    // =============================

    #[error("Collaborator timed out: {0}")]
    CollaboratorTimeout(String),

    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Collaborator returned malformed response: {0}")]
    CollaboratorMalformed(String),

    // =============================
    // Engine / Run Errors
    // =============================

    #[error("Engine input invalid: {0}")]
    EngineInputInvalid(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Transient faults are worth retrying; everything else fails the run
    /// on the first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::CollaboratorTimeout(_)
                | PipelineError::CollaboratorUnavailable(_)
                | PipelineError::HttpError(_)
        )
    }
}
