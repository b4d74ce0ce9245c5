//! Run context threaded through every stage of a sub-sharding run.
//!
//! The [`RunContext`] bundles what a run needs and nothing else:
//!
//! - **Configuration**: the loaded event conversion config
//! - **Roots**: where raw sources live and where sub-shards go
//! - **Options**: chunking, scanning and leasing behavior ([`ShardOptions`])
//! - **Randomness**: the RNG behind the file and chunk shuffles

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use meds_config::EventConversionConfig;
use meds_ingest::ScanOptions;
use meds_shard::{ContentionPolicy, LockFileLeaser};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Default maximum rows per output chunk.
pub const DEFAULT_ROW_CHUNKSIZE: usize = 200_000_000;

/// Default number of rows used to infer CSV schemas.
pub const DEFAULT_INFER_SCHEMA_LENGTH: usize = 10_000;

/// Options controlling how sources are chunked, read and published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOptions {
    pub row_chunksize: NonZeroUsize,
    pub scan: ScanOptions,
    /// Rewrite chunks that already exist.
    pub overwrite: bool,
    pub contention: ContentionPolicy,
    /// Locks older than this are treated as abandoned.
    pub stale_lock_after: Option<Duration>,
}

impl Default for ShardOptions {
    fn default() -> Self {
        Self {
            row_chunksize: NonZeroUsize::new(DEFAULT_ROW_CHUNKSIZE).unwrap_or(NonZeroUsize::MIN),
            scan: ScanOptions::default().with_infer_schema_length(Some(DEFAULT_INFER_SCHEMA_LENGTH)),
            overwrite: false,
            contention: ContentionPolicy::Skip,
            stale_lock_after: None,
        }
    }
}

impl ShardOptions {
    pub fn with_row_chunksize(mut self, rows: NonZeroUsize) -> Self {
        self.row_chunksize = rows;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Leaser configured with this run's contention and stale-lock policy.
    pub fn leaser(&self) -> LockFileLeaser {
        LockFileLeaser::new()
            .with_contention(self.contention)
            .with_stale_after(self.stale_lock_after)
    }
}

/// Everything one run needs.
#[derive(Debug)]
pub struct RunContext {
    pub config: EventConversionConfig,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub options: ShardOptions,
    pub rng: StdRng,
}

impl RunContext {
    /// Creates a context with default options and an entropy-seeded RNG.
    pub fn new(
        config: EventConversionConfig,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            options: ShardOptions::default(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_options(mut self, options: ShardOptions) -> Self {
        self.options = options;
        self
    }

    /// Seeds the shuffles for a reproducible processing order.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self
    }
}
