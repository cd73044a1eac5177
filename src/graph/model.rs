//! Canonical graph records: nodes, edges and statements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Edge labels used by the materializer.
pub mod labels {
    /// Statement → Speaker.
    pub const SPOKEN_BY: &str = "spoken_by";
    /// Statement → Ministry.
    pub const CONCERNS_MINISTRY: &str = "concerns_ministry";
    /// Statement → Video.
    pub const FROM_VIDEO: &str = "from_video";
    /// Statement → Topic.
    pub const MENTIONS_TOPIC: &str = "mentions_topic";
    /// Statement → Bill.
    pub const MENTIONS_BILL: &str = "mentions_bill";
    /// Statement → the statement before it in the same video.
    pub const FOLLOWS: &str = "follows";
}

/// Kind of node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Speaker,
    Ministry,
    Bill,
    Topic,
    Video,
    Statement,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Speaker => "speaker",
            NodeType::Ministry => "ministry",
            NodeType::Bill => "bill",
            NodeType::Topic => "topic",
            NodeType::Video => "video",
            NodeType::Statement => "statement",
        }
    }

    /// Entity nodes are shared across statements; content nodes are not.
    pub fn is_entity(&self) -> bool {
        !matches!(self, NodeType::Video | NodeType::Statement)
    }

    /// Type name as used in serialized graphs (`Speaker`, `Ministry`, ...).
    pub fn class_name(&self) -> &'static str {
        match self {
            NodeType::Speaker => "Speaker",
            NodeType::Ministry => "Ministry",
            NodeType::Bill => "Bill",
            NodeType::Topic => "Topic",
            NodeType::Video => "Video",
            NodeType::Statement => "Statement",
        }
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "speaker" => Ok(NodeType::Speaker),
            "ministry" => Ok(NodeType::Ministry),
            "bill" => Ok(NodeType::Bill),
            "topic" => Ok(NodeType::Topic),
            "video" => Ok(NodeType::Video),
            "statement" => Ok(NodeType::Statement),
            _ => Err(format!("Unknown node type: {}", s)),
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A property value together with the video it was last written from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// String-keyed property bag with last-writer-wins merge.
///
/// A key is only rewritten when its value changes; an identical value keeps the
/// existing provenance, which is what makes repeated merges a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, PropertyValue>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>, source: Option<&str>) {
        self.0.insert(
            key.into(),
            PropertyValue {
                value: value.into(),
                source: source.map(str::to_string),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.value.as_str())
    }

    pub fn source_of(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.source.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `incoming` into `self`. Returns whether anything changed.
    pub fn merge(&mut self, incoming: &PropertyMap) -> bool {
        let mut changed = false;
        for (key, value) in incoming.iter() {
            match self.0.get(key) {
                Some(existing) if existing.value == value.value => {}
                _ => {
                    self.0.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
        }
        changed
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub node_type: NodeType,
    pub canonical_label: String,
    pub uri: String,
    pub properties: PropertyMap,
    /// Bumped each time a merge changes the stored record.
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(node_id: String, node_type: NodeType, canonical_label: String, uri: String) -> Self {
        Self {
            node_id,
            node_type,
            canonical_label,
            uri,
            properties: PropertyMap::new(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Human-readable name, falling back to the canonical label.
    ///
    /// Entity nodes carry one `display_name.<video_id>` per video; the one
    /// from the lowest video id is shown, whatever order videos loaded in.
    pub fn display_name(&self) -> &str {
        self.properties
            .get("display_name")
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|(key, _)| key.starts_with("display_name."))
                    .map(|(_, v)| v.value.as_str())
            })
            .unwrap_or(&self.canonical_label)
    }

    /// Merge another version of the same node into this one.
    pub fn merge_from(&mut self, incoming: &Node) -> bool {
        let mut changed = self.properties.merge(&incoming.properties);
        if self.uri != incoming.uri {
            self.uri = incoming.uri.clone();
            changed = true;
        }
        changed
    }

    /// Content equality, ignoring version bookkeeping.
    pub fn same_content(&self, other: &Node) -> bool {
        self.node_id == other.node_id
            && self.node_type == other.node_type
            && self.canonical_label == other.canonical_label
            && self.uri == other.uri
            && self.properties == other.properties
    }
}

/// A typed, directed relationship between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub label: String,
    pub properties: PropertyMap,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(source_node_id: &str, label: &str, target_node_id: &str) -> Self {
        Self {
            edge_id: super::ids::edge_id(source_node_id, label, target_node_id),
            source_node_id: source_node_id.to_string(),
            target_node_id: target_node_id.to_string(),
            label: label.to_string(),
            properties: PropertyMap::new(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn merge_from(&mut self, incoming: &Edge) -> bool {
        self.properties.merge(&incoming.properties)
    }

    pub fn same_content(&self, other: &Edge) -> bool {
        self.edge_id == other.edge_id
            && self.source_node_id == other.source_node_id
            && self.target_node_id == other.target_node_id
            && self.label == other.label
            && self.properties == other.properties
    }
}

/// Inclusive range of segment indices within a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRange {
    pub first: usize,
    pub last: usize,
}

impl std::fmt::Display for SegmentRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// The atomic content unit derived from one or more transcript segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub statement_id: String,
    pub video_id: String,
    pub segment_range: SegmentRange,
    pub start_ts: f64,
    pub end_ts: f64,
    pub speaker_id: Option<String>,
    pub ministry_id: Option<String>,
    /// `None` when summarization failed after retries.
    pub summary_text: Option<String>,
    /// `None` when embedding failed after retries.
    pub embedding_vector: Option<Vec<f32>>,
    pub raw_text: String,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Statement {
    /// Merge a re-derived version of this statement.
    ///
    /// Missing enrichment never erases enrichment that is already stored.
    pub fn merge_from(&mut self, incoming: &Statement) -> bool {
        let mut changed = false;

        if self.segment_range != incoming.segment_range
            || self.start_ts != incoming.start_ts
            || self.end_ts != incoming.end_ts
            || self.raw_text != incoming.raw_text
        {
            self.segment_range = incoming.segment_range;
            self.start_ts = incoming.start_ts;
            self.end_ts = incoming.end_ts;
            self.raw_text = incoming.raw_text.clone();
            changed = true;
        }
        if self.speaker_id != incoming.speaker_id {
            self.speaker_id = incoming.speaker_id.clone();
            changed = true;
        }
        if self.ministry_id != incoming.ministry_id {
            self.ministry_id = incoming.ministry_id.clone();
            changed = true;
        }
        if incoming.summary_text.is_some() && self.summary_text != incoming.summary_text {
            self.summary_text = incoming.summary_text.clone();
            changed = true;
        }
        if incoming.embedding_vector.is_some() && self.embedding_vector != incoming.embedding_vector {
            self.embedding_vector = incoming.embedding_vector.clone();
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_merge_last_writer_wins() {
        let mut a = PropertyMap::new();
        a.insert("display_name", "Ministry of Health", Some("v1"));
        a.insert("seen_in.v1", "2024-01-01", Some("v1"));

        let mut b = PropertyMap::new();
        b.insert("display_name", "Ministry Of Health", Some("v2"));
        b.insert("seen_in.v2", "2024-02-01", Some("v2"));

        assert!(a.merge(&b));
        assert_eq!(a.get("display_name"), Some("Ministry Of Health"));
        assert_eq!(a.source_of("display_name"), Some("v2"));
        assert_eq!(a.get("seen_in.v1"), Some("2024-01-01"));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_property_merge_is_idempotent() {
        let mut a = PropertyMap::new();
        a.insert("display_name", "Dr. X", Some("v1"));
        let snapshot = a.clone();

        let mut same_value = PropertyMap::new();
        same_value.insert("display_name", "Dr. X", Some("v2"));

        assert!(!a.merge(&snapshot));
        assert!(!a.merge(&same_value));
        assert_eq!(a.source_of("display_name"), Some("v1"));
    }

    #[test]
    fn test_display_name_ignores_merge_order() {
        let seen = |video_id: &str, display: &str| {
            let mut n = Node::new("n".into(), NodeType::Speaker, "x".into(), "u".into());
            n.properties
                .insert(format!("display_name.{}", video_id), display, Some(video_id));
            n
        };
        let (first, second) = (seen("v1", "Dr. X"), seen("v2", "DR. X"));

        let mut forward = first.clone();
        forward.merge_from(&second);
        let mut backward = second.clone();
        backward.merge_from(&first);

        assert_eq!(forward.display_name(), "Dr. X");
        assert_eq!(backward.display_name(), "Dr. X");
        assert!(!forward.merge_from(&backward));
    }

    #[test]
    fn test_statement_merge_keeps_enrichment() {
        let stored = Statement {
            statement_id: "s".into(),
            video_id: "v".into(),
            segment_range: SegmentRange { first: 0, last: 0 },
            start_ts: 0.0,
            end_ts: 5.0,
            speaker_id: None,
            ministry_id: None,
            summary_text: Some("summary".into()),
            embedding_vector: Some(vec![1.0, 0.0]),
            raw_text: "text".into(),
            version: 1,
            updated_at: Utc::now(),
        };
        let mut degraded = stored.clone();
        degraded.summary_text = None;
        degraded.embedding_vector = None;

        let mut merged = stored.clone();
        assert!(!merged.merge_from(&degraded));
        assert_eq!(merged.summary_text.as_deref(), Some("summary"));
        assert!(merged.embedding_vector.is_some());
    }

    #[test]
    fn test_node_type_parse() {
        assert_eq!("Ministry".parse::<NodeType>().unwrap(), NodeType::Ministry);
        assert!("committee".parse::<NodeType>().is_err());
        assert!(NodeType::Topic.is_entity());
        assert!(!NodeType::Statement.is_entity());
    }
}
