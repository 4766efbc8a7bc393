//! Error types for the schema loader.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use vstore_core::StoreError;

/// Result type for schema loader operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while loading, unloading or reloading a fragment.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The fragment file does not exist.
    #[error("fragment file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The fragment file is not a valid fragment.
    #[error("invalid fragment: {0}")]
    Parse(#[from] serde_json::Error),

    /// The store rejected a declaration.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Reading the fragment failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The action value holds an undeclared code.
    #[error("unknown loader action {0}")]
    UnknownAction(i64),
}

impl SchemaError {
    /// Returns true if the error means the file is missing.
    pub fn is_file_not_found(&self) -> bool {
        matches!(self, SchemaError::FileNotFound(_))
    }
}
