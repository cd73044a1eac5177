//! Reembed command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use anyhow::Result;
use std::io::Write;

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Run the reembed command.
pub async fn run_reembed(yes: bool, settings: Settings) -> Result<()> {
    preflight::check(Operation::Build, &settings)?;

    let pipeline = Pipeline::new(settings)?;
    let stats = pipeline.store().stats().await?;
    let model = pipeline.settings().enrichment.embedding_model.clone();
    let dimensions = pipeline.settings().enrichment.dimensions;

    if !yes
        && !confirm(&format!(
            "Re-embed {} statements with {} ({} dimensions)?",
            stats.statements, model, dimensions
        ))?
    {
        Output::info("Cancelled.");
        return Ok(());
    }

    let spinner = Output::spinner("Re-embedding statements...");
    let report = pipeline.reembed().await;
    spinner.finish_and_clear();
    let report = report?;

    Output::success(&format!(
        "Re-embedded {}/{} statements at {} dimensions",
        report.embedded, report.statements, report.dimension
    ));
    if report.failed > 0 {
        Output::warning(&format!(
            "{} statements have no embedding and are only reachable by keyword.",
            report.failed
        ));
    }

    Ok(())
}
