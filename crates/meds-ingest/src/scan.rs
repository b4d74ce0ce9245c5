//! Projected, lazily evaluated scans of raw source files.
//!
//! Every scan carries a sequential row index column so that a file can be cut
//! into row ranges without materializing it.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use polars::prelude::{
    CsvReadOptions, DataFrame, Expr, IdxSize, IntoLazy, LazyCsvReader, LazyFileListReader,
    LazyFrame, PlPath, ScanArgsParquet, SerReader, col, len, lit,
};
use tracing::{debug, info, warn};

use crate::discovery::SourceFormat;
use crate::error::{IngestError, Result};
use crate::plan::RowChunk;

/// Name of the injected row index column.
pub const ROW_IDX_NAME: &str = "__row_idx__";

const ROW_COUNT_NAME: &str = "__row_count__";

/// Options applied when scanning raw sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Rows used to infer a CSV schema. Ignored for Parquet.
    pub infer_schema_length: Option<usize>,
}

impl ScanOptions {
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }
}

/// Scans a source file lazily, keeping only `columns` plus [`ROW_IDX_NAME`].
///
/// An empty `columns` slice keeps every column. Compressed CSV is decompressed
/// and read eagerly since it cannot be scanned in place.
pub fn scan_with_row_idx(
    path: &Path,
    columns: &[String],
    options: &ScanOptions,
) -> Result<LazyFrame> {
    let format = SourceFormat::from_path(path).ok_or_else(|| IngestError::UnsupportedFormat {
        path: path.to_path_buf(),
        suffix: full_suffix(path),
    })?;

    let lf = match format {
        SourceFormat::CsvGz => {
            debug!(path = %path.display(), ?options, "reading as compressed CSV");
            warn!("reading compressed CSV files may be slow and limit parallelizability");
            read_gzip_csv(path, options)?.lazy()
        }
        SourceFormat::Csv => {
            debug!(path = %path.display(), ?options, "reading as CSV");
            scan_csv(path, options)?
        }
        SourceFormat::Parquet | SourceFormat::Par => {
            if let Some(rows) = options.infer_schema_length {
                info!(
                    infer_schema_length = rows,
                    "ignoring infer_schema_length for Parquet files"
                );
            }
            debug!(path = %path.display(), "reading as Parquet");
            let path_str = path.to_string_lossy();
            LazyFrame::scan_parquet(PlPath::new(&path_str), ScanArgsParquet::default())
                .map_err(|e| scan_error(path, &e))?
        }
    };

    let lf = lf.with_row_index(ROW_IDX_NAME, None);
    if columns.is_empty() {
        return Ok(lf);
    }

    debug!(columns = ?columns, "selecting columns");
    let mut projection: Vec<Expr> = Vec::with_capacity(columns.len() + 1);
    projection.push(col(ROW_IDX_NAME));
    projection.extend(columns.iter().map(|name| col(name.as_str())));
    Ok(lf.select(projection))
}

fn scan_csv(path: &Path, options: &ScanOptions) -> Result<LazyFrame> {
    let path_str = path.to_string_lossy();
    let mut reader = LazyCsvReader::new(PlPath::new(&path_str)).with_has_header(true);
    if let Some(rows) = options.infer_schema_length {
        reader = reader.with_infer_schema_length(Some(rows));
    }
    reader.finish().map_err(|e| scan_error(path, &e))
}

fn read_gzip_csv(path: &Path, options: &ScanOptions) -> Result<DataFrame> {
    let file = File::open(path).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut bytes = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut bytes)
        .map_err(|source| IngestError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

    let mut read_options = CsvReadOptions::default().with_has_header(true);
    if let Some(rows) = options.infer_schema_length {
        read_options = read_options.with_infer_schema_length(Some(rows));
    }
    read_options
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| scan_error(path, &e))
}

/// Counts rows without materializing any data column.
pub fn count_rows(path: &Path, lf: LazyFrame) -> Result<usize> {
    let counted = lf
        .select([len().alias(ROW_COUNT_NAME)])
        .collect()
        .map_err(|e| scan_error(path, &e))?;
    counted
        .column(ROW_COUNT_NAME)?
        .get(0)?
        .extract::<usize>()
        .ok_or_else(|| IngestError::Scan {
            path: path.to_path_buf(),
            message: "row count is not an unsigned integer".to_string(),
        })
}

/// Restricts a row-indexed frame to `[chunk.start, chunk.end)`.
pub fn filter_to_row_chunk(lf: LazyFrame, chunk: RowChunk) -> LazyFrame {
    let start = chunk.start as u64;
    let end = chunk.end as u64;
    lf.filter(
        col(ROW_IDX_NAME)
            .gt_eq(lit(start))
            .and(col(ROW_IDX_NAME).lt(lit(end))),
    )
}

/// Materializes one row chunk, dropping the row index column.
///
/// Rows keep the source order.
pub fn collect_row_chunk(path: &Path, lf: LazyFrame, chunk: RowChunk) -> Result<DataFrame> {
    let df = filter_to_row_chunk(lf, chunk)
        .collect()
        .map_err(|e| scan_error(path, &e))?;
    Ok(df.drop(ROW_IDX_NAME)?)
}

/// Reads the first and last `n` rows of a projected scan for diagnostics.
pub fn sample_rows(
    path: &Path,
    columns: &[String],
    options: &ScanOptions,
    n: usize,
) -> Result<(DataFrame, DataFrame)> {
    let lf = scan_with_row_idx(path, columns, options)?;
    let n = IdxSize::try_from(n).unwrap_or(IdxSize::MAX);
    let head = lf
        .clone()
        .limit(n)
        .collect()
        .map_err(|e| scan_error(path, &e))?;
    let tail = lf.tail(n).collect().map_err(|e| scan_error(path, &e))?;
    Ok((head, tail))
}

fn scan_error(path: &Path, err: &polars::prelude::PolarsError) -> IngestError {
    IngestError::Scan {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Everything after the first `.` of the file name, e.g. `.csv.gz`.
fn full_suffix(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .and_then(|name| name.find('.').map(|idx| name[idx..].to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{NamedFrom, Series};

    #[test]
    fn test_full_suffix() {
        assert_eq!(full_suffix(Path::new("/x/test.csv.gz")), ".csv.gz");
        assert_eq!(full_suffix(Path::new("/x/test.json")), ".json");
        assert_eq!(full_suffix(Path::new("/x/noext")), "");
    }

    #[test]
    fn test_filter_to_row_chunk() {
        let df = DataFrame::new(vec![
            Series::new(ROW_IDX_NAME.into(), &[1u32, 2, 3, 4, 5]).into(),
            Series::new("b".into(), &[6i64, 7, 8, 9, 10]).into(),
        ])
        .unwrap();

        let chunk = collect_row_chunk(Path::new("mem"), df.clone().lazy(), RowChunk::new(1, 3))
            .unwrap();
        assert_eq!(chunk.width(), 1);
        assert!(chunk.column(ROW_IDX_NAME).is_err());
        let values: Vec<Option<i64>> = chunk
            .column("b")
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(6), Some(7)]);

        let empty =
            collect_row_chunk(Path::new("mem"), df.lazy(), RowChunk::new(100, 300)).unwrap();
        assert_eq!(empty.height(), 0);
        assert_eq!(empty.width(), 1);
    }

    #[test]
    fn test_unsupported_format() {
        let result = scan_with_row_idx(Path::new("/x/test.json"), &[], &ScanOptions::default());
        match result {
            Err(IngestError::UnsupportedFormat { suffix, .. }) => assert_eq!(suffix, ".json"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an unsupported format error"),
        }
    }
}
