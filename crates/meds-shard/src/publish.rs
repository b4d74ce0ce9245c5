//! Atomic Parquet publication of computed chunks.

use std::fs;
use std::path::{Path, PathBuf};

use meds_ingest::RowChunk;
use polars::prelude::{DataFrame, ParquetWriter};
use tracing::debug;

use crate::error::{Result, ShardError};

/// Destination of a chunk: `<output_root>/<prefix>/[start-end).parquet`.
pub fn chunk_output_path(output_root: &Path, prefix: &str, chunk: RowChunk) -> PathBuf {
    let mut path = output_root.to_path_buf();
    path.extend(prefix.split('/').filter(|part| !part.is_empty()));
    path.push(chunk.file_name());
    path
}

/// Writes `df` to `target` so that readers see either nothing or the whole file.
///
/// The data goes to a uniquely named temp file in the destination directory
/// and is renamed over `target` once synced. Concurrent writers to the same
/// target never share a temp file; the last rename wins.
///
/// Returns the number of bytes written.
pub fn write_parquet_atomic(target: &Path, df: &mut DataFrame) -> Result<u64> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| ShardError::Io {
        operation: "create directory",
        path: parent.to_path_buf(),
        source,
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(&temp_prefix(target))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|source| ShardError::Io {
            operation: "create temp file",
            path: parent.to_path_buf(),
            source,
        })?;
    let temp_path = temp.path().to_path_buf();

    // Dropping `temp` on any error below removes it.
    let bytes = ParquetWriter::new(temp.as_file_mut())
        .finish(df)
        .map_err(|e| ShardError::Parquet {
            path: temp_path.clone(),
            message: e.to_string(),
        })?;
    temp.as_file().sync_all().map_err(|source| ShardError::Io {
        operation: "sync",
        path: temp_path.clone(),
        source,
    })?;

    temp.persist(target)
        .map_err(|e| ShardError::AtomicWriteFailed {
            temp_path,
            target_path: target.to_path_buf(),
            source: e.error,
        })?;

    debug!(path = %target.display(), rows = df.height(), bytes, "published parquet");
    Ok(bytes)
}

/// Hidden prefix tying a temp file to its destination, e.g. `.[0-10).parquet.`.
fn temp_prefix(target: &Path) -> String {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{name}.")
}
