//! Versioned merge shared by the store backends.

use super::UpsertOutcome;
use crate::graph::{Edge, Node, Statement};
use chrono::Utc;
use serde::Serialize;

/// A record the store merges and versions.
pub(crate) trait Versioned: Clone + Serialize {
    const KIND: &'static str;

    fn record_id(&self) -> &str;

    /// Merge `incoming` into `self`, returning whether anything changed.
    fn merge_from(&mut self, incoming: &Self) -> bool;

    fn version(&self) -> u32;

    fn touch(&mut self, version: u32);
}

impl Versioned for Node {
    const KIND: &'static str = "node";

    fn record_id(&self) -> &str {
        &self.node_id
    }

    fn merge_from(&mut self, incoming: &Self) -> bool {
        Node::merge_from(self, incoming)
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn touch(&mut self, version: u32) {
        self.version = version;
        self.updated_at = Utc::now();
    }
}

impl Versioned for Edge {
    const KIND: &'static str = "edge";

    fn record_id(&self) -> &str {
        &self.edge_id
    }

    fn merge_from(&mut self, incoming: &Self) -> bool {
        Edge::merge_from(self, incoming)
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn touch(&mut self, version: u32) {
        self.version = version;
        self.updated_at = Utc::now();
    }
}

impl Versioned for Statement {
    const KIND: &'static str = "statement";

    fn record_id(&self) -> &str {
        &self.statement_id
    }

    fn merge_from(&mut self, incoming: &Self) -> bool {
        Statement::merge_from(self, incoming)
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn touch(&mut self, version: u32) {
        self.version = version;
        self.updated_at = Utc::now();
    }
}

/// Result of merging an incoming record with the stored one.
pub(crate) enum Merged<T> {
    Insert(T),
    Update { previous: T, next: T },
    Unchanged,
}

impl<T> Merged<T> {
    pub(crate) fn outcome(&self) -> UpsertOutcome {
        match self {
            Merged::Insert(_) => UpsertOutcome::Inserted,
            Merged::Update { .. } => UpsertOutcome::Updated,
            Merged::Unchanged => UpsertOutcome::Unchanged,
        }
    }
}

/// Decide what an upsert writes.
pub(crate) fn merge<T: Versioned>(stored: Option<T>, incoming: &T) -> Merged<T> {
    match stored {
        None => {
            let mut fresh = incoming.clone();
            fresh.touch(1);
            Merged::Insert(fresh)
        }
        Some(previous) => {
            let mut next = previous.clone();
            if next.merge_from(incoming) {
                next.touch(previous.version() + 1);
                Merged::Update { previous, next }
            } else {
                Merged::Unchanged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;

    fn node(display: &str) -> Node {
        let mut n = Node::new("n1".into(), NodeType::Ministry, "ministry of health".into(), "u".into());
        n.properties.insert("display_name", display, Some("v1"));
        n
    }

    #[test]
    fn test_merge_versions() {
        let first = match merge(None, &node("Ministry of Health")) {
            Merged::Insert(n) => n,
            _ => panic!("expected insert"),
        };
        assert_eq!(first.version, 1);

        assert!(matches!(
            merge(Some(first.clone()), &node("Ministry of Health")),
            Merged::Unchanged
        ));

        match merge(Some(first), &node("Health Ministry")) {
            Merged::Update { previous, next } => {
                assert_eq!(previous.version, 1);
                assert_eq!(next.version, 2);
                assert_eq!(next.display_name(), "Health Ministry");
            }
            _ => panic!("expected update"),
        }
    }
}
