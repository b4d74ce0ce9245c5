//! Sub-shard production for MEDS event extraction.
//!
//! Each planned row chunk of a source file becomes one Parquet file at
//! `<output>/<prefix>/[start-end).parquet`. Many workers may run against the
//! same output root. Each destination is guarded by a [`Leaser`] and
//! published atomically, so a destination is either absent or complete.
//!
//! # Example
//!
//! ```ignore
//! use meds_shard::{ChunkTask, LockFileLeaser, execute_chunk};
//!
//! let leaser = LockFileLeaser::new();
//! for &chunk in &plan.chunks {
//!     let task = ChunkTask::from_plan(&plan, chunk, output_root, &scan_options);
//!     execute_chunk(&leaser, &task, false)?;
//! }
//! ```

mod error;
mod executor;
mod lease;
mod publish;

// === Error Types ===
pub use error::{Result, ShardError};

// === Leasing ===
pub use lease::{
    Acquisition, ContentionPolicy, Lease, Leaser, LockFileLeaser, LockRecord, read_record,
};

// === Publication ===
pub use publish::{chunk_output_path, write_parquet_atomic};

// === Execution ===
pub use executor::{ChunkOutcome, ChunkTask, execute_chunk};
