//! Error types for the Tabula library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Row position attached to a transform execution failure.
///
/// `None` means the code failed before any row was touched (it did not
/// compile, or it does not define `transform`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRef(pub Option<usize>);

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(row) => write!(f, "row {}", row),
            None => write!(f, "load"),
        }
    }
}

/// Main error type for Tabula operations.
#[derive(Debug, Error)]
pub enum TabulaError {
    /// Unreachable host, rejected credentials, malformed URI, or an expired
    /// call to an external collaborator.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Sampled rows do not yield a stable column set.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Container, sub-container or column does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Classification requested without any example pair.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// The classifier could not produce a label.
    #[error("Classification failed: {0}")]
    Classification(String),

    /// The code generator could not produce code for the label.
    #[error("Code generation failed: {0}")]
    Generation(String),

    /// Generated code faulted while running against the data.
    #[error("Transform failed at {row}: {cause}")]
    TransformExecution { row: RowRef, cause: String },

    /// Backing store rejected a write.
    #[error("Write error: {0}")]
    Write(String),

    /// Revert requested before any container was selected.
    #[error("No pristine snapshot available")]
    NoSnapshot,

    /// Another operation is still running on the same session.
    #[error("Another operation is already in progress for this session")]
    ConcurrentOperation,

    /// The identity provider or an external service rejected the credential.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The operation is not allowed in the current session phase.
    #[error("Operation not allowed: {0}")]
    Precondition(String),

    /// File format not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// TOML configuration parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TabulaError {
    /// Build a transform execution error for a specific row.
    pub fn at_row(row: usize, cause: impl Into<String>) -> Self {
        TabulaError::TransformExecution {
            row: RowRef(Some(row)),
            cause: cause.into(),
        }
    }

    /// Build a transform execution error raised while loading the code.
    pub fn at_load(cause: impl Into<String>) -> Self {
        TabulaError::TransformExecution {
            row: RowRef(None),
            cause: cause.into(),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TabulaError::Connection(_) => "connection_error",
            TabulaError::Schema(_) => "schema_error",
            TabulaError::NotFound(_) => "not_found",
            TabulaError::InsufficientData(_) => "insufficient_data",
            TabulaError::Classification(_) => "classification_error",
            TabulaError::Generation(_) => "generation_error",
            TabulaError::TransformExecution { .. } => "transform_execution_error",
            TabulaError::Write(_) => "write_error",
            TabulaError::NoSnapshot => "no_snapshot",
            TabulaError::ConcurrentOperation => "concurrent_operation",
            TabulaError::Authentication(_) => "authentication_error",
            TabulaError::Precondition(_) => "precondition_failed",
            TabulaError::UnsupportedFormat(_) => "unsupported_format",
            TabulaError::Config(_) => "config_error",
            TabulaError::Io { .. } => "io_error",
            TabulaError::Csv(_) => "csv_error",
            TabulaError::Json(_) => "json_error",
            TabulaError::Sqlite(_) => "sqlite_error",
            TabulaError::Toml(_) => "config_error",
        }
    }
}

/// Result type alias for Tabula operations.
pub type Result<T> = std::result::Result<T, TabulaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_display() {
        let err = TabulaError::at_row(3, "attempt to index a nil value");
        assert_eq!(
            err.to_string(),
            "Transform failed at row 3: attempt to index a nil value"
        );

        let err = TabulaError::at_load("syntax error");
        assert_eq!(err.to_string(), "Transform failed at load: syntax error");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(TabulaError::NoSnapshot.kind(), "no_snapshot");
        assert_eq!(
            TabulaError::ConcurrentOperation.kind(),
            "concurrent_operation"
        );
        assert_eq!(
            TabulaError::Precondition("x".into()).kind(),
            "precondition_failed"
        );
    }
}
