//! Raw source ingestion for event sub-sharding.
//!
//! This crate finds the raw tabular files an extraction needs, scans them
//! lazily with only the required columns, and partitions each file into
//! contiguous row chunks.
//!
//! # Features
//!
//! - **Discovery**: Find `.parquet`, `.par`, `.csv`, and `.csv.gz` files,
//!   keeping one file per logical prefix by format priority
//! - **Projected Scans**: Lazily read only the required columns plus a row index
//! - **Chunk Planning**: Count rows and split them into bounded row ranges
//!
//! # Example
//!
//! ```ignore
//! use std::num::NonZeroUsize;
//! use std::path::Path;
//! use meds_ingest::{ScanOptions, discover_input_files, plan_file};
//!
//! let mut rng = rand::thread_rng();
//! let discovery = discover_input_files(Path::new("raw"), &projection, &mut rng)?;
//! for input in discovery.files {
//!     let columns = projection.columns_for(&input.prefix).unwrap_or_default().to_vec();
//!     let plan = plan_file(input, &columns, NonZeroUsize::new(1_000_000).unwrap(),
//!         &ScanOptions::default(), &mut rng)?;
//! }
//! ```

mod discovery;
mod error;
mod plan;
mod scan;

// === Error Types ===
pub use error::{IngestError, Result};

// === File Discovery ===
pub use discovery::{
    Discovery, InputFile, SkipReason, SkippedFile, SourceFormat, discover_input_files,
    list_source_files, shard_prefix,
};

// === Scanning ===
pub use scan::{
    ROW_IDX_NAME, ScanOptions, collect_row_chunk, count_rows, filter_to_row_chunk, sample_rows,
    scan_with_row_idx,
};

// === Chunk Planning ===
pub use plan::{FilePlan, RowChunk, plan_file, row_chunk_bounds};
