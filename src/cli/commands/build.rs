//! Build command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use anyhow::Result;

/// Run the build command.
pub async fn run_build(ids: &[String], force: bool, settings: Settings) -> Result<()> {
    preflight::check(Operation::Build, &settings)?;

    let pipeline = Pipeline::new(settings)?;

    let spinner = Output::spinner("Building graph...");
    let report = pipeline.build(ids, force).await;
    spinner.finish_and_clear();

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Build aborted: {}", e));
            return Err(e.into());
        }
    };

    Output::header(&format!("Build {}", report.run_id));
    println!();
    for outcome in &report.processed {
        let mut line = format!(
            "{}: {} segments, {} statements ({} inserted, {} updated, {} unchanged)",
            outcome.video_id,
            outcome.segments,
            outcome.statements,
            outcome.load.inserted,
            outcome.load.updated,
            outcome.load.unchanged
        );
        if outcome.degraded > 0 {
            line.push_str(&format!(", {} without enrichment", outcome.degraded));
        }
        Output::list_item(&line);
    }
    for failure in &report.failed {
        Output::error(&format!("{} [{}]: {}", failure.video_id, failure.kind, failure.message));
    }
    for conflict in &report.conflicts {
        Output::warning(&format!(
            "'{}' is both a {} and a {} (video {}); resolve with an alias",
            conflict.canonical_label, conflict.existing, conflict.incoming, conflict.video_id
        ));
    }

    println!();
    Output::kv("Processed", &report.processed.len().to_string());
    Output::kv("Skipped", &report.skipped.len().to_string());
    Output::kv("Failed", &report.failed.len().to_string());

    Ok(())
}
