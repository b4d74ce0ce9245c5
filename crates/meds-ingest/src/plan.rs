//! Row-range partitioning of source files.

use std::num::NonZeroUsize;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::discovery::InputFile;
use crate::error::{IngestError, Result};
use crate::scan::{ScanOptions, count_rows, scan_with_row_idx};

/// A half-open row range `[start, end)` of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowChunk {
    pub start: usize,
    pub end: usize,
}

impl RowChunk {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "row chunk start {start} is past end {end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Output file name for this chunk, e.g. `[0-10).parquet`.
    pub fn file_name(&self) -> String {
        format!("{self}.parquet")
    }
}

impl std::fmt::Display for RowChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{})", self.start, self.end)
    }
}

/// Partitions `[0, row_count)` into consecutive chunks of at most `chunk_size` rows.
pub fn row_chunk_bounds(row_count: usize, chunk_size: NonZeroUsize) -> Vec<RowChunk> {
    let size = chunk_size.get();
    (0..row_count)
        .step_by(size)
        .map(|start| RowChunk::new(start, start.saturating_add(size).min(row_count)))
        .collect()
}

/// Chunk plan for one selected input file.
#[derive(Debug, Clone)]
pub struct FilePlan {
    pub input: InputFile,
    /// Columns read from the source, in projection order.
    pub columns: Vec<String>,
    pub row_count: usize,
    /// Chunks in randomized processing order.
    pub chunks: Vec<RowChunk>,
}

/// Counts the rows of `input` and plans its row chunks.
///
/// A source with zero rows fails with [`IngestError::EmptySource`].
pub fn plan_file<R: Rng + ?Sized>(
    input: InputFile,
    columns: &[String],
    chunk_size: NonZeroUsize,
    options: &ScanOptions,
    rng: &mut R,
) -> Result<FilePlan> {
    info!(
        path = %input.path.display(),
        "performing preliminary read to determine row count"
    );
    let lf = scan_with_row_idx(&input.path, columns, options)?;
    let row_count = count_rows(&input.path, lf)?;

    if row_count == 0 {
        warn!(
            path = %input.path.display(),
            columns = %columns.join(", "),
            "source reports zero rows"
        );
        return Err(IngestError::EmptySource {
            path: input.path,
            columns: columns.to_vec(),
        });
    }

    let mut chunks = row_chunk_bounds(row_count, chunk_size);
    chunks.shuffle(rng);
    info!(
        path = %input.path.display(),
        rows = row_count,
        chunk_count = chunks.len(),
        chunk_size = chunk_size.get(),
        "planned row chunks"
    );

    Ok(FilePlan {
        input,
        columns: columns.to_vec(),
        row_count,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_row_chunk_bounds_uneven() {
        assert_eq!(
            row_chunk_bounds(5, size(2)),
            vec![RowChunk::new(0, 2), RowChunk::new(2, 4), RowChunk::new(4, 5)]
        );
    }

    #[test]
    fn test_row_chunk_bounds_single_chunk() {
        assert_eq!(row_chunk_bounds(6, size(10)), vec![RowChunk::new(0, 6)]);
        assert_eq!(row_chunk_bounds(10, size(10)), vec![RowChunk::new(0, 10)]);
    }

    #[test]
    fn test_row_chunk_bounds_empty() {
        assert!(row_chunk_bounds(0, size(3)).is_empty());
    }

    #[test]
    fn test_row_chunk_display() {
        let chunk = RowChunk::new(10, 16);
        assert_eq!(chunk.to_string(), "[10-16)");
        assert_eq!(chunk.file_name(), "[10-16).parquet");
        assert_eq!(chunk.len(), 6);
    }

    proptest! {
        #[test]
        fn prop_chunks_partition_rows(row_count in 0usize..5_000, chunk_size in 1usize..700) {
            let chunks = row_chunk_bounds(row_count, size(chunk_size));

            prop_assert_eq!(chunks.len(), row_count.div_ceil(chunk_size));
            let mut expected_start = 0;
            for chunk in &chunks {
                prop_assert_eq!(chunk.start, expected_start);
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.len() <= chunk_size);
                expected_start = chunk.end;
            }
            prop_assert_eq!(expected_start, row_count);
        }
    }
}
