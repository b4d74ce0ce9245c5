//! Lease-guarded computation of one row chunk.

use std::path::{Path, PathBuf};

use meds_ingest::{FilePlan, RowChunk, ScanOptions, collect_row_chunk, scan_with_row_idx};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::lease::{Acquisition, Lease, Leaser};
use crate::publish::chunk_output_path;

/// Everything needed to produce one output chunk.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub source: PathBuf,
    pub prefix: String,
    pub columns: Vec<String>,
    pub chunk: RowChunk,
    pub output: PathBuf,
    pub scan_options: ScanOptions,
}

impl ChunkTask {
    /// Builds the task for `chunk` of a planned file.
    pub fn from_plan(
        plan: &FilePlan,
        chunk: RowChunk,
        output_root: &Path,
        scan_options: &ScanOptions,
    ) -> Self {
        Self {
            source: plan.input.path.clone(),
            prefix: plan.input.prefix.clone(),
            columns: plan.columns.clone(),
            chunk,
            output: chunk_output_path(output_root, &plan.input.prefix, chunk),
            scan_options: scan_options.clone(),
        }
    }
}

/// What happened to a chunk. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Written { rows: usize, bytes: u64 },
    AlreadyPresent,
    /// Another worker is producing it.
    Contended,
}

/// Produces `task.output` unless it already exists or is leased elsewhere.
///
/// The lease is always released, including when computing or publishing
/// fails. A compute error takes precedence over a release error.
pub fn execute_chunk<L: Leaser + ?Sized>(
    leaser: &L,
    task: &ChunkTask,
    overwrite: bool,
) -> Result<ChunkOutcome> {
    let lease = match leaser.try_acquire(&task.output, overwrite)? {
        Acquisition::Acquired(lease) => lease,
        Acquisition::AlreadyComplete => {
            info!(path = %task.output.display(), "chunk already present, skipping");
            return Ok(ChunkOutcome::AlreadyPresent);
        }
        Acquisition::Contended => {
            info!(path = %task.output.display(), "chunk is being produced by another worker, skipping");
            return Ok(ChunkOutcome::Contended);
        }
    };

    let written = compute_and_publish(leaser, &lease, task);
    let released = leaser.release(lease);

    match (written, released) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!(
                path = %task.output.display(),
                error = %release_err,
                "failed to release lease after chunk failure"
            );
            Err(e)
        }
    }
}

fn compute_and_publish<L: Leaser + ?Sized>(
    leaser: &L,
    lease: &Lease,
    task: &ChunkTask,
) -> Result<ChunkOutcome> {
    debug!(
        source = %task.source.display(),
        start = task.chunk.start,
        end = task.chunk.end,
        "computing chunk"
    );
    let lf = scan_with_row_idx(&task.source, &task.columns, &task.scan_options)?;
    let mut df = collect_row_chunk(&task.source, lf, task.chunk)?;
    let rows = df.height();
    let bytes = leaser.publish(lease, &mut df)?;

    info!(
        path = %task.output.display(),
        prefix = %task.prefix,
        start = task.chunk.start,
        end = task.chunk.end,
        rows,
        "wrote chunk"
    );
    Ok(ChunkOutcome::Written { rows, bytes })
}
