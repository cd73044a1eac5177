//! Loads materialized batches into a graph store.

use super::{GraphStore, UpsertOutcome};
use crate::error::Result;
use crate::graph::{GraphBatch, LabelConflict};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What loading one batch did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub video_id: String,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: Vec<LabelConflict>,
}

impl LoadReport {
    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// True when the load wrote nothing new.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }
}

/// Writes batches node-first so that no edge is ever stored before its
/// endpoints.
pub struct Loader {
    store: Arc<dyn GraphStore>,
}

impl Loader {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Labels in the batch already stored under a different entity type.
    async fn stored_conflicts(&self, batch: &GraphBatch) -> Result<Vec<LabelConflict>> {
        let mut conflicts = Vec::new();
        for node in batch.nodes.values().filter(|n| n.node_type.is_entity()) {
            for stored in self.store.find_nodes_by_label(&node.canonical_label).await? {
                if !stored.node_type.is_entity() || stored.node_type == node.node_type {
                    continue;
                }
                let conflict = LabelConflict {
                    canonical_label: node.canonical_label.clone(),
                    existing: stored.node_type,
                    incoming: node.node_type,
                    video_id: batch.video_id.clone(),
                };
                if !conflicts.contains(&conflict) {
                    conflicts.push(conflict);
                }
            }
        }
        Ok(conflicts)
    }

    /// Upsert every record of the batch. A dangling edge aborts the load with
    /// the error; records written before it stay written.
    #[instrument(skip(self, batch), fields(video_id = %batch.video_id))]
    pub async fn load(&self, batch: &GraphBatch) -> Result<LoadReport> {
        let mut report = LoadReport {
            video_id: batch.video_id.clone(),
            ..Default::default()
        };

        for conflict in self.stored_conflicts(batch).await? {
            warn!("{}", conflict.to_error());
            report.conflicts.push(conflict);
        }
        report.conflicts.extend(batch.conflicts.iter().cloned());

        for node in batch.nodes.values() {
            let outcome = self.store.upsert_node(node).await?;
            report.count(outcome);
        }
        for statement in &batch.statements {
            let outcome = self.store.upsert_statement(statement).await?;
            report.count(outcome);
        }
        for edge in batch.edges.values() {
            let outcome = self.store.upsert_edge(edge).await?;
            report.count(outcome);
        }

        if report.is_noop() {
            debug!("Batch {} already loaded", batch.video_id);
        } else {
            info!(
                "Loaded {}: {} inserted, {} updated, {} unchanged",
                batch.video_id, report.inserted, report.updated, report.unchanged
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParlError;
    use crate::graph::{ids, labels, Edge, Node, NodeType};
    use crate::store::MemoryGraphStore;

    fn entity(node_type: NodeType, label: &str, video_id: &str) -> Node {
        let id = ids::entity_node_id(node_type, label);
        let mut node = Node::new(id.clone(), node_type, label.into(), format!("u/{}", id));
        node.properties.insert("display_name", label, Some(video_id));
        node
    }

    fn batch(video_id: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> GraphBatch {
        GraphBatch {
            video_id: video_id.into(),
            nodes: nodes.into_iter().map(|n| (n.node_id.clone(), n)).collect(),
            edges: edges.into_iter().map(|e| (e.edge_id.clone(), e)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let loader = Loader::new(store.clone());
        let a = entity(NodeType::Speaker, "dr. x", "v1");
        let b = entity(NodeType::Ministry, "ministry of health", "v1");
        let edge = Edge::new(&a.node_id, labels::CONCERNS_MINISTRY, &b.node_id);
        let input = batch("v1", vec![a, b], vec![edge]);

        let first = loader.load(&input).await.unwrap();
        assert_eq!(first.inserted, 3);
        let second = loader.load(&input).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 3);
        assert_eq!(store.stats().await.unwrap().history_entries, 0);
    }

    #[tokio::test]
    async fn test_dangling_edge_aborts() {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let a = entity(NodeType::Speaker, "dr. x", "v1");
        let edge = Edge::new(&a.node_id, labels::CONCERNS_MINISTRY, "missing");
        let input = batch("v1", vec![a], vec![edge]);

        let err = Loader::new(store.clone()).load(&input).await.unwrap_err();
        assert!(matches!(err, ParlError::DanglingReference { .. }));
        assert!(store.list_edges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_against_stored_label() {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let loader = Loader::new(store.clone());
        loader
            .load(&batch("v1", vec![entity(NodeType::Topic, "budget", "v1")], vec![]))
            .await
            .unwrap();

        let report = loader
            .load(&batch("v2", vec![entity(NodeType::Bill, "budget", "v2")], vec![]))
            .await
            .unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].existing, NodeType::Topic);
        assert_eq!(store.find_nodes_by_label("budget").await.unwrap().len(), 2);
    }
}
