use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info_span;

use meds_cli::context::{RunContext, ShardOptions};
use meds_cli::pipeline::run_shard;
use meds_cli::types::ShardResult;
use meds_config::{load_event_conversion_config, resolve_columns};
use meds_ingest::ScanOptions;
use meds_shard::ContentionPolicy;

use crate::cli::{ContentionArg, ShardArgs};
use crate::summary::print_projection;

/// Interval between lock checks under `--on-contention wait`.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn run_columns(event_config: &Path) -> Result<()> {
    let config = load_event_conversion_config(event_config)
        .with_context(|| format!("load event conversion config {}", event_config.display()))?;
    print_projection(&resolve_columns(&config));
    Ok(())
}

pub fn run_shard_command(args: &ShardArgs) -> Result<ShardResult> {
    let config = info_span!("config", path = %args.event_config.display())
        .in_scope(|| load_event_conversion_config(&args.event_config))
        .with_context(|| {
            format!(
                "load event conversion config {}",
                args.event_config.display()
            )
        })?;

    let mut ctx = RunContext::new(config, &args.input_dir, &args.output_dir)
        .with_options(shard_options(args))
        .with_seed(args.seed);
    run_shard(&mut ctx)
}

fn shard_options(args: &ShardArgs) -> ShardOptions {
    let contention = match args.on_contention {
        ContentionArg::Skip => ContentionPolicy::Skip,
        ContentionArg::Wait => ContentionPolicy::Wait {
            poll_interval: LOCK_POLL_INTERVAL,
            timeout: Duration::from_secs(args.lock_timeout_secs),
        },
    };
    ShardOptions {
        row_chunksize: args.row_chunksize,
        scan: ScanOptions::default().with_infer_schema_length(Some(args.infer_schema_length)),
        overwrite: args.overwrite,
        contention,
        stale_lock_after: args.stale_lock_secs.map(Duration::from_secs),
    }
}
