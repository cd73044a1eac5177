//! Knowledge-graph model, materialization and serialization.

pub mod ids;
mod materialize;
mod model;
mod serialize;

pub use materialize::{Graph, GraphBatch, LabelConflict, MergeStats, Materializer};
pub use model::{labels, Edge, Node, NodeType, PropertyMap, PropertyValue, SegmentRange, Statement};
pub use serialize::{to_json_ld, to_turtle, ExportFormat};
