//! Error taxonomy for the context engine.
//!
//! Per-file indexing failures and per-source research failures are tolerated by
//! their callers and only logged; everything else surfaces through [`ContextError`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by indexing, search, research and orchestration.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Malformed query or request parameters.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Unknown task, file or symbol id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A read or stat on a single path failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Embedding or scoring failure.
    #[error("computation failed: {0}")]
    Computation(String),

    /// A unit of work exceeded its deadline.
    #[error("{operation} timed out after {}ms", elapsed.as_millis())]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    /// An artifact cannot fit into the context window.
    #[error("token budget exceeded: need {required}, {available} available")]
    BudgetExceeded { required: usize, available: usize },

    /// Configuration values that cannot work together.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Glob(#[from] globset::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl ContextError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T, E = ContextError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ContextError::validation("top_k", "must be between 1 and 100");
        assert_eq!(err.to_string(), "invalid top_k: must be between 1 and 100");
        assert!(err.is_validation());

        let err = ContextError::not_found("task", "abc");
        assert_eq!(err.to_string(), "task not found: abc");
        assert!(!err.is_validation());

        let err = ContextError::Timeout {
            operation: "search".to_string(),
            elapsed: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "search timed out after 250ms");
    }

    #[test]
    fn test_io_error_includes_path() {
        let err = ContextError::io(
            "/tmp/missing.ts",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.ts"));
    }
}
