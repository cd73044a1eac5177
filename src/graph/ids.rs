//! Deterministic identifiers.
//!
//! Every id is a truncated SHA-256 over a `|`-joined key, so re-deriving the same
//! input always yields the same id and no shared registry is needed.

use super::NodeType;
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest.
const ID_LEN: usize = 32;

fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..ID_LEN].to_string()
}

/// Id of the statement covering segments `first..=last` of a video.
pub fn statement_id(video_id: &str, first: usize, last: usize) -> String {
    hash_key(&["stmt", video_id, &format!("{}-{}", first, last)])
}

/// Id of an entity node. Content nodes use their own ids instead.
pub fn entity_node_id(node_type: NodeType, canonical_label: &str) -> String {
    hash_key(&[node_type.as_str(), canonical_label])
}

/// Id of an edge.
pub fn edge_id(source_node_id: &str, label: &str, target_node_id: &str) -> String {
    hash_key(&[source_node_id, label, target_node_id])
}
