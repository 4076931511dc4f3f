//! memc-load - load device apps logs into memcached

use anyhow::{Context, Result};
use clap::Parser;
use memc_common::logging::{init_logging, LogConfig, LogLevel};
use memc_load::config::LoaderConfig;
use memc_load::discovery::discover;
use memc_load::pipeline::{Pipeline, RunSummary};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let config = LoaderConfig::parse();

    let mut log_config = LogConfig::from_env()?;
    if config.dry {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    if let Some(ref path) = config.log {
        log_config = log_config.with_file(path);
    }
    let _guard = init_logging(&log_config)?;

    config.validate()?;
    info!(
        dir = %config.dir.display(),
        pattern = %config.pattern,
        parse_workers = config.parse_workers,
        writers_per_partition = config.writers_per_partition,
        dry = config.dry,
        "memc-load started"
    );

    let pattern = config.file_pattern()?;
    let files = discover(&config.dir, &pattern)
        .with_context(|| format!("Failed to list {}", config.dir.display()))?;
    if files.is_empty() {
        info!(dir = %config.dir.display(), "No files to load");
    }

    let pipeline = Pipeline::new(config.pipeline_config(), config.store_clients()?);
    let summary = pipeline.run(&files).await;

    let totals = &summary.totals;
    info!(
        files = totals.files,
        lines_read = totals.lines_read,
        processed = totals.processed,
        errors = totals.errors,
        accepted = totals.accepted,
        rejected = totals.rejected,
        failed = totals.failed,
        "Run complete"
    );

    if let Some(ref path) = config.summary_json {
        write_summary(path, &summary)?;
        info!(path = %path.display(), "Summary written");
    }

    if summary.has_failures() {
        for failed in &summary.failed {
            error!(file = %failed.path.display(), error = %failed.error, "Not loaded");
        }
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write summary to {}", path.display()))
}
