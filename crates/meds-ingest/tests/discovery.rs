//! Integration tests for source discovery.

use std::path::Path;

use meds_config::ColumnProjection;
use meds_ingest::{IngestError, SkipReason, SourceFormat, discover_input_files};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "subject_id\n1\n").unwrap();
}

fn projection(prefixes: &[&str]) -> ColumnProjection {
    prefixes
        .iter()
        .map(|prefix| (*prefix, vec!["subject_id"]))
        .collect()
}

#[test]
fn test_parquet_preferred_over_csv() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "admit_vitals.csv");
    touch(dir.path(), "admit_vitals.parquet");
    touch(dir.path(), "subjects.csv");

    let mut rng = StdRng::seed_from_u64(7);
    let discovery = discover_input_files(
        dir.path(),
        &projection(&["admit_vitals", "subjects"]),
        &mut rng,
    )
    .unwrap();

    let mut selected: Vec<(String, SourceFormat)> = discovery
        .files
        .iter()
        .map(|file| (file.prefix.clone(), file.format))
        .collect();
    selected.sort();
    assert_eq!(
        selected,
        vec![
            ("admit_vitals".to_string(), SourceFormat::Parquet),
            ("subjects".to_string(), SourceFormat::Csv),
        ]
    );

    assert_eq!(discovery.skipped.len(), 1);
    assert_eq!(discovery.skipped[0].prefix, "admit_vitals");
    assert_eq!(
        discovery.skipped[0].reason,
        SkipReason::DuplicatePrefix {
            selected: SourceFormat::Parquet
        }
    );
}

#[test]
fn test_par_preferred_over_csv_gz() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "labs.csv.gz");
    touch(dir.path(), "labs.par");

    let mut rng = StdRng::seed_from_u64(1);
    let discovery = discover_input_files(dir.path(), &projection(&["labs"]), &mut rng).unwrap();

    assert_eq!(discovery.files.len(), 1);
    assert_eq!(discovery.files[0].format, SourceFormat::Par);
}

#[test]
fn test_unconfigured_tables_are_skipped() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "hosp/patients.csv");
    touch(dir.path(), "hosp/notes.csv");

    let mut rng = StdRng::seed_from_u64(3);
    let discovery =
        discover_input_files(dir.path(), &projection(&["hosp/patients"]), &mut rng).unwrap();

    assert_eq!(discovery.files.len(), 1);
    assert_eq!(discovery.files[0].prefix, "hosp/patients");
    assert_eq!(discovery.skipped.len(), 1);
    assert_eq!(discovery.skipped[0].prefix, "hosp/notes");
    assert_eq!(discovery.skipped[0].reason, SkipReason::Unconfigured);
}

#[test]
fn test_no_eligible_input() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "event_cfgs.yaml");
    touch(dir.path(), "other.csv");

    let mut rng = StdRng::seed_from_u64(3);
    let result = discover_input_files(dir.path(), &projection(&["subjects"]), &mut rng);
    assert!(matches!(result, Err(IngestError::NoEligibleInput { .. })));
}

#[test]
fn test_missing_root() {
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let result = discover_input_files(
        &dir.path().join("missing"),
        &projection(&["subjects"]),
        &mut rng,
    );
    assert!(matches!(result, Err(IngestError::DirectoryNotFound { .. })));
}

#[test]
fn test_shuffle_is_seeded() {
    let dir = TempDir::new().unwrap();
    let prefixes: Vec<String> = (0..12).map(|i| format!("table_{i:02}")).collect();
    for prefix in &prefixes {
        touch(dir.path(), &format!("{prefix}.csv"));
    }
    let refs: Vec<&str> = prefixes.iter().map(String::as_str).collect();
    let projection = projection(&refs);

    let order = |seed: u64| -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(seed);
        discover_input_files(dir.path(), &projection, &mut rng)
            .unwrap()
            .files
            .into_iter()
            .map(|file| file.prefix)
            .collect()
    };

    assert_eq!(order(42), order(42));
    let mut sorted = order(42);
    sorted.sort();
    assert_eq!(sorted, prefixes);
}
