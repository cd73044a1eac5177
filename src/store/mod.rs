//! Graph store abstraction for parlgraph.
//!
//! Provides a trait-based interface for persistence backends. Every upsert is
//! an atomic read-modify-write under the backend's own lock: insert if absent,
//! otherwise merge last-writer-wins per property, bump the version and archive
//! the superseded record in the history.

mod loader;
mod memory;
mod merge;
mod sqlite;

pub use loader::{LoadReport, Loader};
pub use memory::MemoryGraphStore;
pub use sqlite::SqliteGraphStore;

use crate::config::Settings;
use crate::error::{ParlError, Result};
use crate::graph::{Edge, GraphBatch, Node, NodeType, Statement};
use crate::ingest::RawVideo;
use crate::segment::Video;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// What an upsert did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// A superseded version of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `node`, `edge`, `statement` or `raw_video`.
    pub record_kind: String,
    pub record_id: String,
    pub version: u32,
    /// JSON of the record as it was before being superseded.
    pub snapshot: String,
    pub superseded_at: DateTime<Utc>,
}

/// A statement with its similarity to a query.
#[derive(Debug, Clone)]
pub struct StatementHit {
    pub statement: Statement,
    pub score: f32,
}

/// Restrictions applied to statements before they are ranked and cut to a
/// limit.
#[derive(Debug, Clone, Default)]
pub struct StatementFilter {
    /// Only statements concerning this ministry node.
    pub ministry_id: Option<String>,
    /// Only statements from these videos.
    pub video_ids: Option<BTreeSet<String>>,
    /// Only statements stored without an embedding.
    pub unembedded_only: bool,
}

impl StatementFilter {
    pub fn admits(&self, statement: &Statement) -> bool {
        if self.unembedded_only && statement.embedding_vector.is_some() {
            return false;
        }
        if let Some(ministry_id) = &self.ministry_id {
            if statement.ministry_id.as_ref() != Some(ministry_id) {
                return false;
            }
        }
        self.video_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&statement.video_id))
    }
}

/// Record counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub raw_videos: usize,
    pub videos: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges: usize,
    pub statements: usize,
    pub statements_without_embedding: usize,
    pub embedding_dimension: Option<usize>,
    pub history_entries: usize,
}

impl StoreStats {
    pub fn nodes(&self) -> usize {
        self.nodes_by_type.values().sum()
    }
}

/// Trait for graph store implementations.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Store a raw video. Returns false when an identical record already exists;
    /// a differing record supersedes the stored one and archives it.
    async fn put_raw_video(&self, raw: &RawVideo) -> Result<bool>;

    async fn get_raw_video(&self, video_id: &str) -> Result<Option<RawVideo>>;

    async fn list_raw_video_ids(&self) -> Result<Vec<String>>;

    /// Store a segmented video.
    async fn put_video(&self, video: &Video) -> Result<()>;

    async fn get_video(&self, video_id: &str) -> Result<Option<Video>>;

    async fn list_videos(&self) -> Result<Vec<Video>>;

    /// Insert or merge a node.
    async fn upsert_node(&self, node: &Node) -> Result<UpsertOutcome>;

    /// Insert or merge an edge. Fails with `DanglingReference` when either
    /// endpoint is not stored.
    async fn upsert_edge(&self, edge: &Edge) -> Result<UpsertOutcome>;

    /// Insert or merge a statement. Fails with `DimensionMismatch` when its
    /// embedding does not match the store's dimension.
    async fn upsert_statement(&self, statement: &Statement) -> Result<UpsertOutcome>;

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>>;

    /// Nodes of any type with this canonical label.
    async fn find_nodes_by_label(&self, canonical_label: &str) -> Result<Vec<Node>>;

    async fn list_nodes(&self, node_type: Option<NodeType>) -> Result<Vec<Node>>;

    async fn list_edges(&self) -> Result<Vec<Edge>>;

    async fn edges_from(&self, node_id: &str) -> Result<Vec<Edge>>;

    async fn edges_to(&self, node_id: &str) -> Result<Vec<Edge>>;

    async fn get_statement(&self, statement_id: &str) -> Result<Option<Statement>>;

    /// Statements ordered by video, then start time.
    async fn list_statements(&self, video_id: Option<&str>) -> Result<Vec<Statement>>;

    /// Superseded versions of a record, oldest first.
    async fn history(&self, record_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Statements admitted by `filter`, nearest to `query` by cosine
    /// similarity. Statements without an embedding never appear.
    async fn nearest_statements(
        &self,
        query: &[f32],
        filter: &StatementFilter,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<StatementHit>>;

    /// Statements admitted by `filter` whose text or summary contains any of
    /// `terms`, best [`term_coverage`] first.
    async fn keyword_candidates(
        &self,
        terms: &[String],
        filter: &StatementFilter,
        limit: usize,
    ) -> Result<Vec<Statement>>;

    /// Embedding dimension recorded for the store, once any embedding is stored.
    async fn embedding_dimension(&self) -> Result<Option<usize>>;

    /// Clear every stored embedding and record a new dimension.
    async fn reset_embeddings(&self, dimension: usize) -> Result<()>;

    /// Replace one statement's embedding, bypassing the merge rule.
    async fn set_statement_embedding(&self, statement_id: &str, embedding: Option<&[f32]>) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Open the store configured in `settings`.
pub fn open(settings: &Settings) -> Result<Arc<dyn GraphStore>> {
    match settings.store.provider.as_str() {
        "sqlite" => Ok(Arc::new(SqliteGraphStore::new(&settings.sqlite_path())?)),
        "memory" => Ok(Arc::new(MemoryGraphStore::new())),
        other => Err(ParlError::Config(format!("Unknown store provider: {}", other))),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Fraction of `terms` found in a statement's text or summary. Matching is
/// case-insensitive over full Unicode, the same for every store.
pub fn term_coverage(terms: &[String], statement: &Statement) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let text = statement.raw_text.to_lowercase();
    let summary = statement.summary_text.as_deref().unwrap_or("").to_lowercase();
    let matched = terms
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| text.contains(t.as_str()) || summary.contains(t.as_str()))
        .count();
    matched as f32 / terms.len() as f32
}

/// Keep the `limit` statements that match the most terms. Ties keep video
/// and time order.
pub(crate) fn rank_keyword_matches(
    statements: impl IntoIterator<Item = Statement>,
    terms: &[String],
    limit: usize,
) -> Vec<Statement> {
    let mut scored: Vec<(f32, Statement)> = statements
        .into_iter()
        .map(|s| (term_coverage(terms, &s), s))
        .filter(|(coverage, _)| *coverage > 0.0)
        .collect();
    scored.sort_by(|(a_cov, a), (b_cov, b)| {
        b_cov
            .total_cmp(a_cov)
            .then_with(|| a.video_id.cmp(&b.video_id))
            .then_with(|| a.start_ts.total_cmp(&b.start_ts))
            .then_with(|| a.statement_id.cmp(&b.statement_id))
    });
    scored.truncate(limit);
    scored.into_iter().map(|(_, s)| s).collect()
}

/// Rebuild a video's graph view from stored records: its video node, its
/// statements, their outgoing edges and every node those edges reach.
pub async fn video_batch(store: &dyn GraphStore, video_id: &str) -> Result<GraphBatch> {
    let video_node = store
        .get_node(video_id)
        .await?
        .ok_or_else(|| ParlError::NotFound(format!("video {} is not in the graph", video_id)))?;

    let statements = store.list_statements(Some(video_id)).await?;
    let mut batch = GraphBatch {
        video_id: video_id.to_string(),
        ..Default::default()
    };
    batch.nodes.insert(video_node.node_id.clone(), video_node);

    let mut wanted: BTreeSet<String> = BTreeSet::new();
    for statement in &statements {
        wanted.insert(statement.statement_id.clone());
        for edge in store.edges_from(&statement.statement_id).await? {
            wanted.insert(edge.target_node_id.clone());
            batch.edges.insert(edge.edge_id.clone(), edge);
        }
    }
    for node_id in wanted {
        if batch.nodes.contains_key(&node_id) {
            continue;
        }
        if let Some(node) = store.get_node(&node_id).await? {
            batch.nodes.insert(node_id, node);
        }
    }
    batch.statements = statements;

    Ok(batch)
}
