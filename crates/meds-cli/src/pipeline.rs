//! Stages of a sub-sharding run.
//!
//! A run resolves the column projection, discovers inputs, plans every file,
//! and only then writes chunks. Planning first means a bad configuration or
//! an empty source aborts the run before any output directory exists.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use meds_config::{ColumnProjection, resolve_columns};
use meds_ingest::{
    Discovery, FilePlan, IngestError, InputFile, ScanOptions, discover_input_files, plan_file,
    sample_rows,
};
use meds_shard::{ChunkOutcome, ChunkTask, Leaser, execute_chunk};
use tracing::{debug, error, info, info_span, warn};

use crate::context::RunContext;
use crate::logging::{REDACTED_VALUE, log_data_enabled};
use crate::types::{ChunkFailure, FileSummary, ShardResult};

/// Rows shown from each end of a file in empty-source diagnostics.
const DIAGNOSTIC_SAMPLE_ROWS: usize = 10;

/// Runs every stage against the context's roots.
///
/// Configuration, discovery and planning errors abort the run. Chunk
/// failures are collected into the result so unrelated chunks still run.
pub fn run_shard(ctx: &mut RunContext) -> Result<ShardResult> {
    let started = Instant::now();

    let projection = info_span!("config").in_scope(|| {
        let projection = resolve_columns(&ctx.config);
        for (prefix, columns) in projection.iter() {
            debug!(prefix = %prefix, columns = %columns.join(", "), "resolved columns");
        }
        projection
    });

    let discover_span = info_span!("discover", input_dir = %ctx.input_dir.display());
    let Discovery { files, skipped } = discover_span
        .in_scope(|| discover_input_files(&ctx.input_dir, &projection, &mut ctx.rng))
        .with_context(|| format!("discover inputs under {}", ctx.input_dir.display()))?;
    info!(selected = files.len(), skipped = skipped.len(), "discovered input files");

    let plans = info_span!("plan").in_scope(|| plan_all(ctx, &projection, files))?;

    let ctx: &RunContext = ctx;
    let leaser = ctx.options.leaser();
    let shard_span = info_span!("shard", output_dir = %ctx.output_dir.display());
    let (summaries, failures) = shard_span.in_scope(|| shard_all(ctx, &leaser, &plans));

    let elapsed = started.elapsed();
    info!(
        files = summaries.len(),
        failed_chunks = failures.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "sub-sharding finished"
    );

    Ok(ShardResult {
        input_dir: ctx.input_dir.clone(),
        output_dir: ctx.output_dir.clone(),
        files: summaries,
        skipped,
        failures,
        elapsed,
    })
}

fn plan_all(
    ctx: &mut RunContext,
    projection: &ColumnProjection,
    files: Vec<InputFile>,
) -> Result<Vec<FilePlan>> {
    let mut plans = Vec::with_capacity(files.len());
    for input in files {
        let columns = projection
            .columns_for(&input.prefix)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let path = input.path.clone();
        let _file = info_span!("file", prefix = %input.prefix).entered();

        match plan_file(
            input,
            &columns,
            ctx.options.row_chunksize,
            &ctx.options.scan,
            &mut ctx.rng,
        ) {
            Ok(plan) => plans.push(plan),
            Err(err @ IngestError::EmptySource { .. }) => {
                log_empty_source(&path, &columns, &ctx.options.scan);
                return Err(err.into());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("plan {}", path.display()));
            }
        }
    }
    Ok(plans)
}

fn shard_all<L: Leaser + ?Sized>(
    ctx: &RunContext,
    leaser: &L,
    plans: &[FilePlan],
) -> (Vec<FileSummary>, Vec<ChunkFailure>) {
    let mut summaries = Vec::with_capacity(plans.len());
    let mut failures = Vec::new();

    for plan in plans {
        let _file = info_span!("file", prefix = %plan.input.prefix).entered();
        let mut summary = FileSummary {
            prefix: plan.input.prefix.clone(),
            path: plan.input.path.clone(),
            format: plan.input.format,
            rows: plan.row_count,
            chunks: plan.chunks.len(),
            written: 0,
            rows_written: 0,
            already_present: 0,
            contended: 0,
            failed: 0,
        };

        for &chunk in &plan.chunks {
            let task = ChunkTask::from_plan(plan, chunk, &ctx.output_dir, &ctx.options.scan);
            match execute_chunk(leaser, &task, ctx.options.overwrite) {
                Ok(ChunkOutcome::Written { rows, .. }) => {
                    summary.written += 1;
                    summary.rows_written += rows;
                }
                Ok(ChunkOutcome::AlreadyPresent) => summary.already_present += 1,
                Ok(ChunkOutcome::Contended) => summary.contended += 1,
                Err(err) => {
                    error!(
                        path = %task.output.display(),
                        start = chunk.start,
                        end = chunk.end,
                        error = %err,
                        "failed to produce chunk"
                    );
                    summary.failed += 1;
                    failures.push(ChunkFailure {
                        prefix: plan.input.prefix.clone(),
                        chunk,
                        output: task.output.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        summaries.push(summary);
    }

    (summaries, failures)
}

/// Logs what an operator needs to tell an empty extract from a bad config.
fn log_empty_source(path: &Path, columns: &[String], scan: &ScanOptions) {
    error!(
        path = %path.display(),
        columns = %columns.join(", "),
        "source has no rows; exclude it from the event conversion configuration if this is expected"
    );
    if !log_data_enabled() {
        warn!(head = REDACTED_VALUE, tail = REDACTED_VALUE, "pass --log-data to log sample rows");
        return;
    }
    match sample_rows(path, columns, scan, DIAGNOSTIC_SAMPLE_ROWS) {
        Ok((head, tail)) => error!(path = %path.display(), %head, %tail, "source sample"),
        Err(err) => warn!(path = %path.display(), error = %err, "could not sample source"),
    }
}
