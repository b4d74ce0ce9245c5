//! Integration tests for projected scans and chunk planning.

use std::fs::File;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use meds_ingest::{
    IngestError, InputFile, ROW_IDX_NAME, RowChunk, ScanOptions, SourceFormat, collect_row_chunk,
    count_rows, plan_file, sample_rows, scan_with_row_idx,
};
use polars::prelude::{Column, DataFrame, NamedFrom, ParquetWriter};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

const LABS_CSV: &str = "\
subject_id,labtime,value,unused
1,2020-01-01,5.0,a
1,2020-01-02,6.0,b
2,2020-02-01,7.5,c
3,2020-03-01,8.25,d
3,2020-03-02,9.0,e
";

fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn write_csv_gz(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

fn write_parquet(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut df = DataFrame::new(vec![
        Column::new("subject_id".into(), &[1i64, 1, 2, 3, 3]),
        Column::new("value".into(), &[5.0f64, 6.0, 7.5, 8.25, 9.0]),
        Column::new("unused".into(), &["a", "b", "c", "d", "e"]),
    ])
    .unwrap();
    ParquetWriter::new(File::create(&path).unwrap())
        .finish(&mut df)
        .unwrap();
    path
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn subject_ids(df: &DataFrame) -> Vec<Option<i64>> {
    df.column("subject_id")
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

fn input(path: PathBuf, prefix: &str) -> InputFile {
    let format = SourceFormat::from_path(&path).unwrap();
    InputFile {
        path,
        prefix: prefix.to_string(),
        format,
    }
}

#[test]
fn test_csv_projection_keeps_requested_columns() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "labs.csv", LABS_CSV);
    let cols = columns(&["labtime", "subject_id", "value"]);

    let lf = scan_with_row_idx(&path, &cols, &ScanOptions::default()).unwrap();
    let df = lf.collect().unwrap();

    assert_eq!(df.width(), 4);
    assert!(df.column(ROW_IDX_NAME).is_ok());
    assert!(df.column("unused").is_err());
    assert_eq!(df.height(), 5);
}

#[test]
fn test_empty_projection_keeps_all_columns() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "labs.csv", LABS_CSV);

    let df = scan_with_row_idx(&path, &[], &ScanOptions::default())
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(df.width(), 5);
}

#[test]
fn test_count_rows_each_format() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(dir.path(), "a.csv", LABS_CSV);
    let gz = write_csv_gz(dir.path(), "b.csv.gz", LABS_CSV);
    let parquet = write_parquet(dir.path(), "c.parquet");
    let cols = columns(&["subject_id", "value"]);
    let options = ScanOptions::default().with_infer_schema_length(Some(100));

    for path in [csv, gz, parquet] {
        let lf = scan_with_row_idx(&path, &cols, &options).unwrap();
        assert_eq!(count_rows(&path, lf).unwrap(), 5, "{}", path.display());
    }
}

#[test]
fn test_collect_row_chunk_preserves_order() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(dir.path(), "labs.parquet");
    let cols = columns(&["subject_id", "value"]);

    let lf = scan_with_row_idx(&path, &cols, &ScanOptions::default()).unwrap();
    let df = collect_row_chunk(&path, lf, RowChunk::new(1, 4)).unwrap();

    assert_eq!(df.width(), 2);
    assert_eq!(subject_ids(&df), vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn test_collect_row_chunk_from_compressed_csv() {
    let dir = TempDir::new().unwrap();
    let path = write_csv_gz(dir.path(), "labs.csv.gz", LABS_CSV);
    let cols = columns(&["subject_id"]);

    let lf = scan_with_row_idx(&path, &cols, &ScanOptions::default()).unwrap();
    let df = collect_row_chunk(&path, lf, RowChunk::new(3, 5)).unwrap();
    assert_eq!(subject_ids(&df), vec![Some(3), Some(3)]);
}

#[test]
fn test_missing_column_fails_on_collect() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "labs.csv", LABS_CSV);
    let cols = columns(&["not_a_column"]);

    let counted = scan_with_row_idx(&path, &cols, &ScanOptions::default())
        .and_then(|lf| count_rows(&path, lf));
    assert!(counted.is_err());
}

#[test]
fn test_plan_file_chunks() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "labs.csv", LABS_CSV);
    let mut rng = StdRng::seed_from_u64(0);

    let plan = plan_file(
        input(path, "labs"),
        &columns(&["subject_id"]),
        NonZeroUsize::new(2).unwrap(),
        &ScanOptions::default(),
        &mut rng,
    )
    .unwrap();

    assert_eq!(plan.row_count, 5);
    assert_eq!(plan.columns, columns(&["subject_id"]));
    let mut chunks = plan.chunks.clone();
    chunks.sort();
    assert_eq!(
        chunks,
        vec![RowChunk::new(0, 2), RowChunk::new(2, 4), RowChunk::new(4, 5)]
    );
}

#[test]
fn test_plan_file_rejects_empty_source() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "empty.csv", "subject_id,value\n");
    let mut rng = StdRng::seed_from_u64(0);

    let result = plan_file(
        input(path.clone(), "empty"),
        &columns(&["subject_id", "value"]),
        NonZeroUsize::new(10).unwrap(),
        &ScanOptions::default(),
        &mut rng,
    );

    match result {
        Err(IngestError::EmptySource {
            path: reported,
            columns: reported_columns,
        }) => {
            assert_eq!(reported, path);
            assert_eq!(reported_columns, columns(&["subject_id", "value"]));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(plan) => panic!("expected an empty source error, planned {} rows", plan.row_count),
    }
}

#[test]
fn test_sample_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "labs.csv", LABS_CSV);

    let (head, tail) =
        sample_rows(&path, &columns(&["subject_id"]), &ScanOptions::default(), 2).unwrap();
    assert_eq!(head.height(), 2);
    assert_eq!(tail.height(), 2);
    assert_eq!(subject_ids(&head), vec![Some(1), Some(1)]);
    assert_eq!(subject_ids(&tail), vec![Some(3), Some(3)]);
}
