//! Source file discovery under a raw cohort directory.
//!
//! Files are grouped by logical prefix (path relative to the root with all
//! suffixes removed). When a prefix exists in several formats only the most
//! preferred one is used, and prefixes absent from the column projection are
//! ignored because extraction never reads them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use meds_config::ColumnProjection;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

/// Supported raw source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceFormat {
    Parquet,
    Par,
    Csv,
    CsvGz,
}

impl SourceFormat {
    /// Formats in order of preference.
    pub const PRIORITY: [SourceFormat; 4] = [
        SourceFormat::Parquet,
        SourceFormat::Par,
        SourceFormat::Csv,
        SourceFormat::CsvGz,
    ];

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Parquet => "parquet",
            SourceFormat::Par => "par",
            SourceFormat::Csv => "csv",
            SourceFormat::CsvGz => "csv.gz",
        }
    }

    /// Detects the format from the file name (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        // Longest extension first so `csv.gz` is not mistaken for anything else.
        [
            SourceFormat::CsvGz,
            SourceFormat::Parquet,
            SourceFormat::Par,
            SourceFormat::Csv,
        ]
        .into_iter()
        .find(|format| {
            name.strip_suffix(format.extension())
                .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
        })
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// A raw source file selected for sub-sharding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    /// Logical table identity, e.g. `hosp/patients`.
    pub prefix: String,
    pub format: SourceFormat,
}

/// Why a discovered file was not selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Same prefix already selected in a preferred format.
    DuplicatePrefix { selected: SourceFormat },
    /// Prefix is not referenced by the event conversion configuration.
    Unconfigured,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DuplicatePrefix { selected } => {
                write!(f, "already added in preferred format .{selected}")
            }
            SkipReason::Unconfigured => {
                f.write_str("not specified in the event conversion configuration")
            }
        }
    }
}

/// A discovered file that will not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub prefix: String,
    pub reason: SkipReason,
}

/// Result of source discovery.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Selected files in randomized processing order.
    pub files: Vec<InputFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Computes the logical prefix of a file relative to the source root.
///
/// Parent directories are kept and the file name is cut at its first `.`,
/// so `<root>/d/e.csv.gz` becomes `d/e`.
pub fn shard_prefix(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| IngestError::NotUnderRoot {
            root: root.to_path_buf(),
            path: path.to_path_buf(),
        })?;

    let mut parts: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();

    let file_name = relative
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default().to_string();
    parts.push(stem);

    Ok(parts.join("/"))
}

/// Lists files of one format anywhere under `root`, sorted by path.
pub fn list_source_files(root: &Path, format: SourceFormat) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*.{}",
        Pattern::escape(&root.to_string_lossy()),
        format.extension()
    );
    let entries = glob::glob(&pattern).map_err(|e| IngestError::InvalidPattern {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| IngestError::DirectoryRead {
            path: e.path().to_path_buf(),
            source: std::io::Error::from(e),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Selects the files to sub-shard under `root`.
///
/// Formats are scanned in [`SourceFormat::PRIORITY`] order. The selection is
/// shuffled with `rng` to spread contention between concurrent workers.
pub fn discover_input_files<R: Rng + ?Sized>(
    root: &Path,
    projection: &ColumnProjection,
    rng: &mut R,
) -> Result<Discovery> {
    if !root.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut selected: BTreeMap<String, SourceFormat> = BTreeMap::new();
    let mut discovery = Discovery::default();

    for format in SourceFormat::PRIORITY {
        for path in list_source_files(root, format)? {
            let prefix = shard_prefix(root, &path)?;

            if let Some(&preferred) = selected.get(&prefix) {
                warn!(
                    path = %path.display(),
                    prefix = %prefix,
                    "skipping file as it has already been added in a preferred format"
                );
                discovery.skipped.push(SkippedFile {
                    path,
                    prefix,
                    reason: SkipReason::DuplicatePrefix {
                        selected: preferred,
                    },
                });
                continue;
            }

            if !projection.contains(&prefix) {
                warn!(
                    path = %path.display(),
                    prefix = %prefix,
                    "skipping file as it is not specified in the event conversion configuration"
                );
                discovery.skipped.push(SkippedFile {
                    path,
                    prefix,
                    reason: SkipReason::Unconfigured,
                });
                continue;
            }

            debug!(path = %path.display(), prefix = %prefix, format = %format, "selected input file");
            selected.insert(prefix.clone(), format);
            discovery.files.push(InputFile {
                path,
                prefix,
                format,
            });
        }
    }

    if discovery.files.is_empty() {
        return Err(IngestError::NoEligibleInput {
            root: root.to_path_buf(),
        });
    }

    discovery.files.shuffle(rng);
    Ok(discovery)
}
