//! CLI argument definitions for the event sub-sharder.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "meds-shard-events",
    version,
    about = "Split raw source tables into row-chunked Parquet sub-shards",
    long_about = "Split raw source tables into row-chunked Parquet sub-shards.\n\n\
                  Only the columns the event conversion configuration needs are kept.\n\
                  Safe to run from many workers against the same output directory.\n\
                  Only local filesystem paths are supported; remote URLs such as\n\
                  s3://bucket/raw are rejected."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow row values (PHI) in diagnostics.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sub-shard every configured source table under INPUT_DIR.
    Shard(ShardArgs),

    /// Print the columns each configured table needs.
    Columns(ColumnsArgs),
}

#[derive(Parser)]
pub struct ShardArgs {
    /// Local root directory of the raw source tables.
    #[arg(value_name = "INPUT_DIR", value_parser = parse_local_path)]
    pub input_dir: PathBuf,

    /// Local root directory for the sub-shards.
    #[arg(long = "output-dir", value_name = "DIR", value_parser = parse_local_path)]
    pub output_dir: PathBuf,

    /// Event conversion configuration (YAML).
    #[arg(long = "event-config", value_name = "PATH", value_parser = parse_local_path)]
    pub event_config: PathBuf,

    /// Maximum rows per output chunk.
    #[arg(long = "row-chunksize", value_name = "ROWS", default_value = "200000000")]
    pub row_chunksize: NonZeroUsize,

    /// Rows used to infer CSV schemas. Ignored for Parquet.
    #[arg(long = "infer-schema-length", value_name = "ROWS", default_value = "10000")]
    pub infer_schema_length: usize,

    /// Rewrite chunks that already exist.
    #[arg(long = "overwrite")]
    pub overwrite: bool,

    /// Seed for the file and chunk processing order.
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    /// What to do when another worker holds a chunk's lock.
    #[arg(long = "on-contention", value_enum, default_value = "skip")]
    pub on_contention: ContentionArg,

    /// Give up waiting for a held lock after this many seconds.
    #[arg(long = "lock-timeout-secs", value_name = "SECS", default_value = "3600")]
    pub lock_timeout_secs: u64,

    /// Break lock files older than this many seconds.
    ///
    /// Only use this when a lock can only be this old because its worker
    /// was killed. Breaking a live worker's lock lets two workers compute
    /// the same chunk.
    #[arg(long = "stale-lock-secs", value_name = "SECS")]
    pub stale_lock_secs: Option<u64>,
}

#[derive(Parser)]
pub struct ColumnsArgs {
    /// Event conversion configuration (YAML).
    #[arg(value_name = "PATH")]
    pub event_config: PathBuf,
}

/// Accepts local filesystem paths only.
fn parse_local_path(raw: &str) -> Result<PathBuf, String> {
    match raw.split_once("://") {
        Some((scheme, _))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            Err(format!(
                "'{raw}' looks like a {scheme}:// URL; only local filesystem paths are supported"
            ))
        }
        _ => Ok(PathBuf::from(raw)),
    }
}

/// CLI contention policy choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum ContentionArg {
    Skip,
    Wait,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_shard_defaults() {
        let cli = Cli::parse_from([
            "meds-shard-events",
            "shard",
            "raw",
            "--output-dir",
            "out",
            "--event-config",
            "event_cfgs.yaml",
        ]);
        let Command::Shard(args) = cli.command else {
            panic!("expected shard subcommand");
        };
        assert_eq!(args.row_chunksize.get(), 200_000_000);
        assert_eq!(args.infer_schema_length, 10_000);
        assert!(!args.overwrite);
        assert!(matches!(args.on_contention, ContentionArg::Skip));
        assert_eq!(args.stale_lock_secs, None);
        assert!(!cli.log_data);
    }

    #[test]
    fn test_zero_chunksize_rejected() {
        let result = Cli::try_parse_from([
            "meds-shard-events",
            "shard",
            "raw",
            "--output-dir",
            "out",
            "--event-config",
            "cfg.yaml",
            "--row-chunksize",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_remote_url_rejected() {
        let result = Cli::try_parse_from([
            "meds-shard-events",
            "shard",
            "s3://bucket/raw",
            "--output-dir",
            "out",
            "--event-config",
            "cfg.yaml",
        ]);
        let err = result.err().unwrap().to_string();
        assert!(err.contains("only local filesystem paths are supported"));
    }

    #[test]
    fn test_local_path_parsing() {
        assert_eq!(
            parse_local_path("data/raw").unwrap(),
            PathBuf::from("data/raw")
        );
        assert!(parse_local_path("gs://bucket/out").is_err());
        assert!(parse_local_path("file://tmp/raw").is_err());
    }
}
