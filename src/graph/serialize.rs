//! Turtle and JSON-LD projections of a graph batch.
//!
//! Both are derived views regenerated from the canonical records on demand.

use super::{Edge, GraphBatch, Node};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";

/// Serialized graph formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Turtle,
    JsonLd,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Turtle => "ttl",
            ExportFormat::JsonLd => "jsonld",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ttl" | "turtle" => Ok(ExportFormat::Turtle),
            "jsonld" | "json-ld" | "json" => Ok(ExportFormat::JsonLd),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

fn ontology(base_uri: &str) -> String {
    format!("{}ontology/", base_uri)
}

/// Property keys may contain `.` and other characters that are not valid in
/// prefixed names.
fn local_name(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Outgoing edges per source node, sorted by label then target.
fn edges_by_source(batch: &GraphBatch) -> BTreeMap<&str, Vec<&Edge>> {
    let mut grouped: BTreeMap<&str, Vec<&Edge>> = BTreeMap::new();
    for edge in batch.edges.values() {
        grouped
            .entry(edge.source_node_id.as_str())
            .or_default()
            .push(edge);
    }
    for edges in grouped.values_mut() {
        edges.sort_by(|a, b| {
            (a.label.as_str(), a.target_node_id.as_str())
                .cmp(&(b.label.as_str(), b.target_node_id.as_str()))
        });
    }
    grouped
}

fn uri_of(batch: &GraphBatch, base_uri: &str, node_id: &str) -> String {
    batch
        .nodes
        .get(node_id)
        .map(|n| n.uri.clone())
        .unwrap_or_else(|| format!("{}node/{}", base_uri, node_id))
}

/// Render the batch as Turtle.
pub fn to_turtle(batch: &GraphBatch, base_uri: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("@prefix pg: <{}> .\n", ontology(base_uri)));
    out.push_str(&format!("@prefix rdfs: <{}> .\n\n", RDFS));

    let edges = edges_by_source(batch);

    for node in batch.nodes.values() {
        let mut lines = vec![
            format!("a pg:{}", node.node_type.class_name()),
            format!("rdfs:label \"{}\"", escape_literal(&node.canonical_label)),
        ];
        for (key, value) in node.properties.iter() {
            lines.push(format!(
                "pg:{} \"{}\"",
                local_name(key),
                escape_literal(&value.value)
            ));
        }
        for edge in edges.get(node.node_id.as_str()).into_iter().flatten() {
            lines.push(format!(
                "pg:{} <{}>",
                local_name(&edge.label),
                uri_of(batch, base_uri, &edge.target_node_id)
            ));
        }

        out.push_str(&format!("<{}> {} .\n\n", node.uri, lines.join(" ;\n    ")));
    }

    // Edges whose source is outside the batch still belong to the view.
    for (source, source_edges) in &edges {
        if batch.nodes.contains_key(*source) {
            continue;
        }
        for edge in source_edges {
            out.push_str(&format!(
                "<{}> pg:{} <{}> .\n",
                uri_of(batch, base_uri, source),
                local_name(&edge.label),
                uri_of(batch, base_uri, &edge.target_node_id)
            ));
        }
    }

    out
}

fn node_object(node: &Node, edges: Option<&Vec<&Edge>>, batch: &GraphBatch, base_uri: &str) -> Value {
    let mut obj = Map::new();
    obj.insert("@id".to_string(), json!(node.uri));
    obj.insert("@type".to_string(), json!(node.node_type.class_name()));
    obj.insert("label".to_string(), json!(node.canonical_label));
    for (key, value) in node.properties.iter() {
        obj.insert(local_name(key), json!(value.value));
    }

    let mut links: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for edge in edges.into_iter().flatten() {
        links
            .entry(local_name(&edge.label))
            .or_default()
            .push(json!({"@id": uri_of(batch, base_uri, &edge.target_node_id)}));
    }
    for (label, targets) in links {
        obj.insert(label, Value::Array(targets));
    }

    Value::Object(obj)
}

/// Render the batch as a JSON-LD document.
pub fn to_json_ld(batch: &GraphBatch, base_uri: &str) -> Value {
    let edges = edges_by_source(batch);
    let graph: Vec<Value> = batch
        .nodes
        .values()
        .map(|node| node_object(node, edges.get(node.node_id.as_str()), batch, base_uri))
        .collect();

    json!({
        "@context": {
            "@vocab": ontology(base_uri),
            "rdfs": RDFS,
            "label": "rdfs:label",
        },
        "@graph": graph,
    })
}
