use std::path::PathBuf;
use std::time::Duration;

use meds_ingest::{RowChunk, SkippedFile, SourceFormat};

#[derive(Debug)]
pub struct ShardResult {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub files: Vec<FileSummary>,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<ChunkFailure>,
    pub elapsed: Duration,
}

impl ShardResult {
    /// Any chunk failed to materialize.
    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn chunks_written(&self) -> usize {
        self.files.iter().map(|file| file.written).sum()
    }
}

#[derive(Debug, Clone)]
pub struct FileSummary {
    pub prefix: String,
    pub path: PathBuf,
    pub format: SourceFormat,
    pub rows: usize,
    pub chunks: usize,
    pub written: usize,
    pub rows_written: usize,
    pub already_present: usize,
    pub contended: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub prefix: String,
    pub chunk: RowChunk,
    pub output: PathBuf,
    pub message: String,
}
