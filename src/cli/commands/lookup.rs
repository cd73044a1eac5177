//! Lookup command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::graph::NodeType;
use crate::pipeline::Pipeline;
use anyhow::Result;

/// Run the lookup command.
pub async fn run_lookup(entity_type: &str, label: &str, settings: Settings) -> Result<()> {
    preflight::check(Operation::Lookup, &settings)?;

    let node_type: NodeType = entity_type.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    if !node_type.is_entity() {
        anyhow::bail!("'{}' is not an entity type (speaker, ministry, topic, bill)", entity_type);
    }

    let engine = Pipeline::new(settings)?.query_engine();
    let results = engine.lookup_entity(node_type, label).await;

    if results.is_empty() {
        Output::warning(&format!("No statements linked to {} '{}'.", node_type, label));
        return Ok(());
    }

    Output::success(&format!("{} statements linked to {} '{}'", results.len(), node_type, label));
    for record in &results {
        Output::search_result(record);
    }

    Ok(())
}
