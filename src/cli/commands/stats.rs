//! Stats command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store;
use anyhow::Result;

/// Run the stats command.
pub async fn run_stats(settings: Settings) -> Result<()> {
    let store = store::open(&settings)?;
    let stats = store.stats().await?;

    Output::header("Graph Store");
    println!();
    Output::kv("Provider", &settings.store.provider);
    Output::kv("Raw videos", &stats.raw_videos.to_string());
    Output::kv("Built videos", &stats.videos.to_string());
    Output::kv("Nodes", &stats.nodes().to_string());
    for (node_type, count) in &stats.nodes_by_type {
        Output::list_item(&format!("{}: {}", node_type, count));
    }
    Output::kv("Edges", &stats.edges.to_string());
    Output::kv("Statements", &stats.statements.to_string());
    Output::kv(
        "Without embedding",
        &stats.statements_without_embedding.to_string(),
    );
    Output::kv(
        "Embedding dimension",
        &stats
            .embedding_dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    Output::kv("Superseded versions", &stats.history_entries.to_string());

    if let Some(dimension) = stats.embedding_dimension {
        if dimension != settings.enrichment.dimensions as usize {
            println!();
            Output::warning(&format!(
                "Configured dimensions ({}) differ from the store ({}); run 'parlgraph reembed'.",
                settings.enrichment.dimensions, dimension
            ));
        }
    }

    Ok(())
}
