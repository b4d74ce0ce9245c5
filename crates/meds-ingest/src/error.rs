//! Error types for raw source ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while discovering, scanning, or planning source files.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    /// Source root not found or not a directory.
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Failed to walk a directory.
    #[error("failed to read directory entry {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Discovered path does not live under the source root.
    #[error("{path} is not under source root {root}")]
    NotUnderRoot { root: PathBuf, path: PathBuf },

    /// Search pattern could not be built from the source root.
    #[error("invalid search pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    // === Discovery Errors ===
    /// No file under the root is both supported and configured.
    #[error("can't find any files in {root} to sub-shard")]
    NoEligibleInput { root: PathBuf },

    // === Scan Errors ===
    /// File extension outside the supported set.
    #[error("unsupported file type {suffix:?} for {path}")]
    UnsupportedFormat { path: PathBuf, suffix: String },

    /// Source scanned to zero rows.
    #[error(
        "file {path} has no rows; if this is not an error, exclude it from the event conversion configuration"
    )]
    EmptySource { path: PathBuf, columns: Vec<String> },

    /// Polars failed while scanning a specific file.
    #[error("failed to scan {path}: {message}")]
    Scan { path: PathBuf, message: String },

    // === DataFrame Errors ===
    /// Failed DataFrame operation.
    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for IngestError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
