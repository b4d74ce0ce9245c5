//! Error types for sub-shard production.

use std::path::PathBuf;
use std::time::Duration;

use meds_ingest::IngestError;
use thiserror::Error;

/// Errors that can occur while leasing, computing, or publishing a chunk.
#[derive(Debug, Error)]
pub enum ShardError {
    /// File I/O error.
    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Temp file could not be renamed onto the destination.
    #[error("failed to publish {target_path} from {temp_path}: {source}")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another worker kept the lease for longer than the wait budget.
    #[error("timed out after {waited:?} waiting for the lease on {target}")]
    LeaseTimeout { target: PathBuf, waited: Duration },

    /// Lock record could not be encoded or decoded.
    #[error("invalid lock record {path}: {source}")]
    LockRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Parquet encoding failed.
    #[error("failed to write parquet {path}: {message}")]
    Parquet { path: PathBuf, message: String },

    /// Reading the source chunk failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Result type for shard operations.
pub type Result<T> = std::result::Result<T, ShardError>;
