//! Error types for the completion pipeline

use thiserror::Error;

/// Errors raised while configuring or running the completion pipeline
///
/// Source failures never leave the fan-out boundary as errors: the merge
/// engine records them as a failed source outcome and keeps going. This type
/// is what sources, collaborators and the configuration layer return.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source '{source_name}' failed: {message}")]
    SourceError {
        source_name: String,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Editor error: {0}")]
    EditorError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl CompletionError {
    /// Build a failure attributed to a named source
    pub fn source_failure(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Result type used across the crate
pub type CompletionResult<T> = Result<T, CompletionError>;
