//! Export command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::graph::ExportFormat;
use crate::pipeline::Pipeline;
use anyhow::Result;

/// Run the export command.
pub async fn run_export(
    video_id: &str,
    output: Option<String>,
    format: &str,
    settings: Settings,
) -> Result<()> {
    let export_format: ExportFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let pipeline = Pipeline::new(settings)?;
    let output_str = match pipeline.export_graph(video_id, export_format).await {
        Ok(s) => s,
        Err(crate::error::ParlError::NotFound(_)) => {
            Output::error(&format!("No graph found for video ID: {}", video_id));
            Output::info("Use 'parlgraph list' to see built videos.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // Write output
    match output {
        Some(path) if path != "-" => {
            std::fs::write(&path, &output_str)?;
            Output::success(&format!(
                "Exported graph of {} to {} ({})",
                video_id,
                path,
                export_format.extension()
            ));
        }
        _ => {
            println!("{}", output_str);
        }
    }

    Ok(())
}
