//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::enrich::RetryPolicy;
use crate::ingest::{extract_video_id, Ingestor, JsonFileProvider};
use crate::store;
use anyhow::Result;

/// Run the ingest command.
pub async fn run_ingest(source: &str, ids: &[String], force: bool, settings: Settings) -> Result<()> {
    preflight::check(Operation::Ingest, &settings)?;
    let path = Settings::expand_path(source);
    preflight::check_source(&path)?;

    let ids: Vec<String> = ids
        .iter()
        .map(|input| extract_video_id(input).unwrap_or_else(|| input.clone()))
        .collect();

    let provider = JsonFileProvider::new(path);
    let ingestor = Ingestor::new(
        store::open(&settings)?,
        RetryPolicy::from_settings(&settings.enrichment),
    );

    let spinner = Output::spinner("Ingesting transcripts...");
    let report = ingestor.ingest(&provider, &ids, force).await;
    spinner.finish_and_clear();
    let report = report?;

    if !report.ingested.is_empty() {
        Output::success(&format!("Ingested {} videos", report.ingested.len()));
    }
    if !report.skipped.is_empty() {
        Output::info(&format!(
            "Skipped {} already ingested videos (use --force to replace)",
            report.skipped.len()
        ));
    }
    for failure in &report.failed {
        Output::error(&format!("{} [{}]: {}", failure.video_id, failure.kind, failure.message));
    }
    if report.ingested.is_empty() && report.skipped.is_empty() && report.failed.is_empty() {
        Output::warning("No videos found in the source.");
    }

    Ok(())
}
