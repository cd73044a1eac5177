//! In-memory graph store implementation.
//!
//! Useful for testing and small datasets.

use super::merge::{merge, Merged, Versioned};
use super::{
    cosine_similarity, rank_keyword_matches, GraphStore, HistoryEntry, StatementFilter,
    StatementHit, StoreStats, UpsertOutcome,
};
use crate::error::{ParlError, Result};
use crate::graph::{Edge, Node, NodeType, Statement};
use crate::ingest::RawVideo;
use crate::segment::Video;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    raw_videos: BTreeMap<String, RawVideo>,
    videos: BTreeMap<String, Video>,
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    statements: BTreeMap<String, Statement>,
    history: Vec<HistoryEntry>,
    dimension: Option<usize>,
}

impl Inner {
    fn archive<T: Versioned>(&mut self, previous: &T) -> Result<()> {
        self.archive_raw(T::KIND, previous.record_id(), previous.version(), previous)
    }

    fn archive_raw<S: serde::Serialize>(
        &mut self,
        kind: &str,
        id: &str,
        version: u32,
        record: &S,
    ) -> Result<()> {
        self.history.push(HistoryEntry {
            record_kind: kind.to_string(),
            record_id: id.to_string(),
            version,
            snapshot: serde_json::to_string(record)?,
            superseded_at: Utc::now(),
        });
        Ok(())
    }
}

/// In-memory graph store.
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
}

impl MemoryGraphStore {
    /// Create a new in-memory graph store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| ParlError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| ParlError::Store(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_statements(statements: &mut [Statement]) {
    statements.sort_by(|a, b| {
        a.video_id
            .cmp(&b.video_id)
            .then(a.start_ts.total_cmp(&b.start_ts))
            .then(a.statement_id.cmp(&b.statement_id))
    });
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn put_raw_video(&self, raw: &RawVideo) -> Result<bool> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.raw_videos.get(&raw.video_id).cloned() {
            if existing == *raw {
                return Ok(false);
            }
            let version = inner.history.iter().filter(|h| h.record_id == raw.video_id).count() as u32 + 1;
            inner.archive_raw("raw_video", &raw.video_id, version, &existing)?;
        }
        inner.raw_videos.insert(raw.video_id.clone(), raw.clone());
        Ok(true)
    }

    async fn get_raw_video(&self, video_id: &str) -> Result<Option<RawVideo>> {
        Ok(self.read()?.raw_videos.get(video_id).cloned())
    }

    async fn list_raw_video_ids(&self) -> Result<Vec<String>> {
        Ok(self.read()?.raw_videos.keys().cloned().collect())
    }

    async fn put_video(&self, video: &Video) -> Result<()> {
        self.write()?
            .videos
            .insert(video.video_id.clone(), video.clone());
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        Ok(self.read()?.videos.get(video_id).cloned())
    }

    async fn list_videos(&self) -> Result<Vec<Video>> {
        Ok(self.read()?.videos.values().cloned().collect())
    }

    async fn upsert_node(&self, node: &Node) -> Result<UpsertOutcome> {
        let mut inner = self.write()?;
        let merged = merge(inner.nodes.get(&node.node_id).cloned(), node);
        let outcome = merged.outcome();
        match merged {
            Merged::Insert(next) => {
                inner.nodes.insert(next.node_id.clone(), next);
            }
            Merged::Update { previous, next } => {
                inner.archive(&previous)?;
                inner.nodes.insert(next.node_id.clone(), next);
            }
            Merged::Unchanged => {}
        }
        Ok(outcome)
    }

    async fn upsert_edge(&self, edge: &Edge) -> Result<UpsertOutcome> {
        let mut inner = self.write()?;
        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            if !inner.nodes.contains_key(endpoint) {
                return Err(ParlError::DanglingReference {
                    edge_id: edge.edge_id.clone(),
                    missing_node_id: endpoint.clone(),
                });
            }
        }

        let merged = merge(inner.edges.get(&edge.edge_id).cloned(), edge);
        let outcome = merged.outcome();
        match merged {
            Merged::Insert(next) => {
                inner.edges.insert(next.edge_id.clone(), next);
            }
            Merged::Update { previous, next } => {
                inner.archive(&previous)?;
                inner.edges.insert(next.edge_id.clone(), next);
            }
            Merged::Unchanged => {}
        }
        Ok(outcome)
    }

    async fn upsert_statement(&self, statement: &Statement) -> Result<UpsertOutcome> {
        let mut inner = self.write()?;
        if let Some(vector) = &statement.embedding_vector {
            match inner.dimension {
                Some(expected) if expected != vector.len() => {
                    return Err(ParlError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
                Some(_) => {}
                None => inner.dimension = Some(vector.len()),
            }
        }

        let merged = merge(inner.statements.get(&statement.statement_id).cloned(), statement);
        let outcome = merged.outcome();
        match merged {
            Merged::Insert(next) => {
                inner.statements.insert(next.statement_id.clone(), next);
            }
            Merged::Update { previous, next } => {
                inner.archive(&previous)?;
                inner.statements.insert(next.statement_id.clone(), next);
            }
            Merged::Unchanged => {}
        }
        Ok(outcome)
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>> {
        Ok(self.read()?.nodes.get(node_id).cloned())
    }

    async fn find_nodes_by_label(&self, canonical_label: &str) -> Result<Vec<Node>> {
        Ok(self
            .read()?
            .nodes
            .values()
            .filter(|n| n.canonical_label == canonical_label)
            .cloned()
            .collect())
    }

    async fn list_nodes(&self, node_type: Option<NodeType>) -> Result<Vec<Node>> {
        Ok(self
            .read()?
            .nodes
            .values()
            .filter(|n| node_type.map_or(true, |t| n.node_type == t))
            .cloned()
            .collect())
    }

    async fn list_edges(&self) -> Result<Vec<Edge>> {
        Ok(self.read()?.edges.values().cloned().collect())
    }

    async fn edges_from(&self, node_id: &str) -> Result<Vec<Edge>> {
        Ok(self
            .read()?
            .edges
            .values()
            .filter(|e| e.source_node_id == node_id)
            .cloned()
            .collect())
    }

    async fn edges_to(&self, node_id: &str) -> Result<Vec<Edge>> {
        Ok(self
            .read()?
            .edges
            .values()
            .filter(|e| e.target_node_id == node_id)
            .cloned()
            .collect())
    }

    async fn get_statement(&self, statement_id: &str) -> Result<Option<Statement>> {
        Ok(self.read()?.statements.get(statement_id).cloned())
    }

    async fn list_statements(&self, video_id: Option<&str>) -> Result<Vec<Statement>> {
        let mut statements: Vec<Statement> = self
            .read()?
            .statements
            .values()
            .filter(|s| video_id.map_or(true, |v| s.video_id == v))
            .cloned()
            .collect();
        sort_statements(&mut statements);
        Ok(statements)
    }

    async fn history(&self, record_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .read()?
            .history
            .iter()
            .filter(|h| h.record_id == record_id)
            .cloned()
            .collect())
    }

    async fn nearest_statements(
        &self,
        query: &[f32],
        filter: &StatementFilter,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<StatementHit>> {
        let inner = self.read()?;

        let mut results: Vec<StatementHit> = inner
            .statements
            .values()
            .filter(|s| filter.admits(s))
            .filter_map(|s| {
                let embedding = s.embedding_vector.as_ref()?;
                Some(StatementHit {
                    score: cosine_similarity(query, embedding),
                    statement: s.clone(),
                })
            })
            .filter(|r| r.score >= min_score)
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(results)
    }

    async fn keyword_candidates(
        &self,
        terms: &[String],
        filter: &StatementFilter,
        limit: usize,
    ) -> Result<Vec<Statement>> {
        let admitted: Vec<Statement> = self
            .read()?
            .statements
            .values()
            .filter(|s| filter.admits(s))
            .cloned()
            .collect();
        Ok(rank_keyword_matches(admitted, terms, limit))
    }

    async fn embedding_dimension(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dimension)
    }

    async fn reset_embeddings(&self, dimension: usize) -> Result<()> {
        let mut inner = self.write()?;
        for statement in inner.statements.values_mut() {
            statement.embedding_vector = None;
        }
        inner.dimension = Some(dimension);
        Ok(())
    }

    async fn set_statement_embedding(&self, statement_id: &str, embedding: Option<&[f32]>) -> Result<()> {
        let mut inner = self.write()?;
        if let (Some(vector), Some(expected)) = (embedding, inner.dimension) {
            if vector.len() != expected {
                return Err(ParlError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let statement = inner
            .statements
            .get_mut(statement_id)
            .ok_or_else(|| ParlError::NotFound(format!("statement {}", statement_id)))?;
        statement.embedding_vector = embedding.map(<[f32]>::to_vec);
        statement.updated_at = Utc::now();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.read()?;
        let mut nodes_by_type = BTreeMap::new();
        for node in inner.nodes.values() {
            *nodes_by_type.entry(node.node_type.to_string()).or_insert(0) += 1;
        }
        Ok(StoreStats {
            raw_videos: inner.raw_videos.len(),
            videos: inner.videos.len(),
            nodes_by_type,
            edges: inner.edges.len(),
            statements: inner.statements.len(),
            statements_without_embedding: inner
                .statements
                .values()
                .filter(|s| s.embedding_vector.is_none())
                .count(),
            embedding_dimension: inner.dimension,
            history_entries: inner.history.len(),
        })
    }
}
