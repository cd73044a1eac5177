//! Graph materialization: extracted statements to canonical nodes and edges.

use super::{labels, Edge, Node, NodeType, Statement};
use crate::error::ParlError;
use crate::extract::{EntityRef, ExtractedVideo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

/// The same canonical label resolved to two different entity types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConflict {
    pub canonical_label: String,
    pub existing: NodeType,
    pub incoming: NodeType,
    pub video_id: String,
}

impl LabelConflict {
    pub fn to_error(&self) -> ParlError {
        ParlError::SchemaConflict {
            canonical_label: self.canonical_label.clone(),
            existing: self.existing.to_string(),
            incoming: self.incoming.to_string(),
        }
    }
}

/// Canonical records derived from one video.
#[derive(Debug, Clone, Default)]
pub struct GraphBatch {
    pub video_id: String,
    pub nodes: BTreeMap<String, Node>,
    pub edges: BTreeMap<String, Edge>,
    pub statements: Vec<Statement>,
    pub conflicts: Vec<LabelConflict>,
}

/// Counts from merging a batch into an accumulated graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub merged: usize,
    pub unchanged: usize,
}

/// An in-memory accumulated graph, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    pub edges: BTreeMap<String, Edge>,
    pub statements: BTreeMap<String, Statement>,
    pub conflicts: Vec<LabelConflict>,
}

impl GraphBatch {
    fn add_node(&mut self, node: Node) {
        match self.nodes.get_mut(&node.node_id) {
            Some(existing) => {
                existing.merge_from(&node);
            }
            None => {
                self.nodes.insert(node.node_id.clone(), node);
            }
        }
    }

    fn add_edge(&mut self, edge: Edge) {
        match self.edges.get_mut(&edge.edge_id) {
            Some(existing) => {
                existing.merge_from(&edge);
            }
            None => {
                self.edges.insert(edge.edge_id.clone(), edge);
            }
        }
    }

    /// Merge this batch into `graph` with the same last-writer-wins rule the
    /// store uses. Labels already present under another type are recorded as
    /// conflicts; both nodes are kept.
    pub fn merge_into(&self, graph: &mut Graph) -> MergeStats {
        let mut stats = MergeStats::default();

        let mut types_by_label: HashMap<&str, NodeType> = HashMap::new();
        for node in graph.nodes.values().filter(|n| n.node_type.is_entity()) {
            types_by_label.insert(node.canonical_label.as_str(), node.node_type);
        }
        let mut new_conflicts = Vec::new();
        for node in self.nodes.values().filter(|n| n.node_type.is_entity()) {
            if let Some(existing) = types_by_label.get(node.canonical_label.as_str()) {
                if *existing != node.node_type {
                    new_conflicts.push(LabelConflict {
                        canonical_label: node.canonical_label.clone(),
                        existing: *existing,
                        incoming: node.node_type,
                        video_id: self.video_id.clone(),
                    });
                }
            }
        }
        graph.conflicts.extend(new_conflicts);
        graph.conflicts.extend(self.conflicts.iter().cloned());

        for node in self.nodes.values() {
            match graph.nodes.get_mut(&node.node_id) {
                Some(existing) => {
                    if existing.merge_from(node) {
                        stats.merged += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
                None => {
                    graph.nodes.insert(node.node_id.clone(), node.clone());
                    stats.inserted += 1;
                }
            }
        }
        for edge in self.edges.values() {
            match graph.edges.get_mut(&edge.edge_id) {
                Some(existing) => {
                    if existing.merge_from(edge) {
                        stats.merged += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
                None => {
                    graph.edges.insert(edge.edge_id.clone(), edge.clone());
                    stats.inserted += 1;
                }
            }
        }
        for statement in &self.statements {
            match graph.statements.get_mut(&statement.statement_id) {
                Some(existing) => {
                    if existing.merge_from(statement) {
                        stats.merged += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
                None => {
                    graph
                        .statements
                        .insert(statement.statement_id.clone(), statement.clone());
                    stats.inserted += 1;
                }
            }
        }

        stats
    }
}

/// Builds canonical graph records from extracted videos.
#[derive(Debug, Clone)]
pub struct Materializer {
    base_uri: String,
}

impl Materializer {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
        }
    }

    /// URI minted for a node.
    pub fn node_uri(&self, node_type: NodeType, node_id: &str) -> String {
        format!("{}{}/{}", self.base_uri, node_type.as_str(), node_id)
    }

    fn entity_node(&self, entity: &EntityRef, video_id: &str, session: &str) -> Node {
        let node_id = entity.node_id();
        let mut node = Node::new(
            node_id.clone(),
            entity.node_type,
            entity.canonical_label.clone(),
            self.node_uri(entity.node_type, &node_id),
        );
        node.properties.insert(
            format!("display_name.{}", video_id),
            entity.display_name.clone(),
            Some(video_id),
        );
        node.properties
            .insert(format!("seen_in.{}", video_id), session, Some(video_id));
        node
    }

    /// Materialize one extracted video into a batch of canonical records.
    #[instrument(skip(self, extracted), fields(video_id = %extracted.video.video_id))]
    pub fn materialize(&self, extracted: &ExtractedVideo) -> GraphBatch {
        let video = &extracted.video;
        let video_id = video.video_id.as_str();
        let source = Some(video_id);
        let session = video
            .session_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());

        let mut batch = GraphBatch {
            video_id: video_id.to_string(),
            ..Default::default()
        };

        let mut video_node = Node::new(
            video_id.to_string(),
            NodeType::Video,
            video_id.to_string(),
            self.node_uri(NodeType::Video, video_id),
        );
        let props = &mut video_node.properties;
        props.insert("title", video.title.clone(), source);
        props.insert("source_uri", video.source_uri.clone(), source);
        props.insert("language", video.language.clone(), source);
        props.insert("segment_count", video.segments.len().to_string(), source);
        if let Some(date) = video.session_date {
            props.insert("session_date", date.to_string(), source);
        }
        if let Some(channel) = &video.channel {
            props.insert("channel", channel.clone(), source);
        }
        if let Some(published) = video.published_at {
            props.insert("published_at", published.to_rfc3339(), source);
        }
        if let Some(hint) = &video.ministry_hint {
            props.insert("ministry_hint", hint.clone(), source);
        }
        batch.add_node(video_node);

        let mut types_by_label: HashMap<String, NodeType> = HashMap::new();
        let mut previous: Option<String> = None;

        for item in &extracted.statements {
            let statement = &item.statement;
            let statement_id = statement.statement_id.as_str();

            let mut node = Node::new(
                statement_id.to_string(),
                NodeType::Statement,
                statement_id.to_string(),
                self.node_uri(NodeType::Statement, statement_id),
            );
            let props = &mut node.properties;
            props.insert("video_id", video_id, source);
            props.insert("segment_range", statement.segment_range.to_string(), source);
            props.insert("start_ts", format!("{:.3}", statement.start_ts), source);
            props.insert("end_ts", format!("{:.3}", statement.end_ts), source);
            props.insert("raw_text", statement.raw_text.clone(), source);
            if let Some(summary) = &statement.summary_text {
                props.insert("summary", summary.clone(), source);
            }
            batch.add_node(node);

            batch.add_edge(self.edge(statement_id, labels::FROM_VIDEO, video_id, statement, source));

            if let Some(speaker) = &item.speaker {
                let mut node = self.entity_node(speaker, video_id, &session);
                if let Some(ministry) = &item.ministry {
                    node.properties.insert(
                        format!("ministry.{}", video_id),
                        ministry.display_name.clone(),
                        source,
                    );
                }
                batch.add_node(node);
                batch.add_edge(Edge::new(statement_id, labels::SPOKEN_BY, &speaker.node_id()));
            }
            if let Some(ministry) = &item.ministry {
                batch.add_node(self.entity_node(ministry, video_id, &session));
                batch.add_edge(Edge::new(
                    statement_id,
                    labels::CONCERNS_MINISTRY,
                    &ministry.node_id(),
                ));
            }
            for topic in &item.topics {
                batch.add_node(self.entity_node(topic, video_id, &session));
                batch.add_edge(Edge::new(statement_id, labels::MENTIONS_TOPIC, &topic.node_id()));
            }
            for bill in &item.bills {
                batch.add_node(self.entity_node(bill, video_id, &session));
                batch.add_edge(Edge::new(statement_id, labels::MENTIONS_BILL, &bill.node_id()));
            }

            let entities = item
                .speaker
                .iter()
                .chain(item.ministry.iter())
                .chain(item.topics.iter())
                .chain(item.bills.iter());
            for entity in entities {
                match types_by_label.get(&entity.canonical_label) {
                    Some(existing) if *existing != entity.node_type => {
                        let conflict = LabelConflict {
                            canonical_label: entity.canonical_label.clone(),
                            existing: *existing,
                            incoming: entity.node_type,
                            video_id: video_id.to_string(),
                        };
                        if !batch.conflicts.contains(&conflict) {
                            warn!("{}", conflict.to_error());
                            batch.conflicts.push(conflict);
                        }
                    }
                    Some(_) => {}
                    None => {
                        types_by_label.insert(entity.canonical_label.clone(), entity.node_type);
                    }
                }
            }

            if let Some(prev) = &previous {
                batch.add_edge(Edge::new(statement_id, labels::FOLLOWS, prev));
            }
            previous = Some(statement_id.to_string());

            batch.statements.push(statement.clone());
        }

        debug!(
            "Materialized {}: {} nodes, {} edges, {} statements",
            video_id,
            batch.nodes.len(),
            batch.edges.len(),
            batch.statements.len()
        );
        batch
    }

    fn edge(
        &self,
        source_id: &str,
        label: &str,
        target_id: &str,
        statement: &Statement,
        source: Option<&str>,
    ) -> Edge {
        let mut edge = Edge::new(source_id, label, target_id);
        edge.properties
            .insert("start_ts", format!("{:.3}", statement.start_ts), source);
        edge
    }
}
