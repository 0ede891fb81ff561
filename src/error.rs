//! Error types for the document retrieval engine.
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Vector-level failures (dimension mismatch, invalid score).
    #[error(transparent)]
    Vector(#[from] VectorError),

    /// A configured index backend could not be initialized or reached.
    #[error(
        "Index backend '{backend}' unavailable: {reason}\nSuggestion: Retry the operation, or configure the 'flat' backend for a fresh collection"
    )]
    BackendUnavailable { backend: String, reason: String },

    /// Writing or reading a snapshot failed. In-memory state remains
    /// authoritative for the running process; durability is lost until the
    /// next successful save.
    #[error("Failed to persist collection state to '{}': {source}\nSuggestion: Check disk space and file permissions", path.display())]
    PersistenceFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A persisted snapshot failed structural validation and was not loaded.
    #[error(
        "Snapshot at '{}' is corrupted: {reason}\nSuggestion: Delete the snapshot files to start the collection empty, or restore them from a backup", path.display()
    )]
    SnapshotCorrupted { path: PathBuf, reason: String },

    /// Tenant ownership check failed on a delete.
    #[error(
        "Not authorized to delete document '{id}'\nSuggestion: Documents can only be deleted by their owning tenant"
    )]
    Unauthorized { id: String },

    /// A retrieval call exceeded its caller-specified timeout.
    #[error("Search timed out after {waited_ms}ms\nSuggestion: Raise the timeout or lower top_k")]
    Timeout { waited_ms: u64 },

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl EngineError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in structured responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(VectorError::InvalidDimension { .. }) => "INVALID_DIMENSION",
            Self::Vector(VectorError::InvalidScore { .. }) => "INVALID_SCORE",
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
            Self::SnapshotCorrupted { .. } => "SNAPSHOT_CORRUPTED",
            Self::Unauthorized { .. } => "UNAUTHORIZED_ACCESS",
            Self::Timeout { .. } => "SEARCH_TIMEOUT",
            Self::Config { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "Re-embed the chunk with the model the collection was created with",
                "Reset the collection if you intend to switch embedding models",
            ],
            Self::BackendUnavailable { .. } => vec![
                "Retry the operation; remote backend failures are often transient",
                "A fresh collection can fall back to the exact in-memory backend",
            ],
            Self::PersistenceFailure { .. } => vec![
                "The in-memory state is still valid; the next successful save restores durability",
                "Check disk space and permissions for the persist directory",
            ],
            Self::SnapshotCorrupted { .. } => vec![
                "Remove the snapshot files to start empty and re-ingest documents",
            ],
            Self::Timeout { .. } => vec![
                "Retry with a larger timeout, or reduce top_k",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let err = EngineError::Vector(VectorError::DimensionMismatch {
            expected: 1536,
            actual: 768,
        });
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");

        let err = EngineError::Unauthorized {
            id: "doc-1".to_string(),
        };
        assert_eq!(err.status_code(), "UNAUTHORIZED_ACCESS");

        let err = EngineError::Timeout { waited_ms: 25 };
        assert_eq!(err.status_code(), "SEARCH_TIMEOUT");
    }

    #[test]
    fn test_messages_carry_suggestions() {
        let err = EngineError::BackendUnavailable {
            backend: "remote".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("connection refused"));
        assert!(msg.contains("Suggestion:"));
        assert!(!err.recovery_suggestions().is_empty());
    }
}
