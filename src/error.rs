//! Error types for parlgraph.

use thiserror::Error;

/// Library-level error type for parlgraph operations.
///
/// The first five variants are the pipeline's failure taxonomy. Collaborator
/// failures (video platform, summarizer, embedder) are folded into
/// [`ParlError::ProviderUnavailable`] so callers never see provider-specific
/// error shapes.
#[derive(Error, Debug)]
pub enum ParlError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Segmentation failed for video {video_id}: {reason}")]
    Segmentation { video_id: String, reason: String },

    #[error("Enrichment degraded for statement {statement_id}: {reason}")]
    EnrichmentDegraded { statement_id: String, reason: String },

    #[error("Dangling reference: edge {edge_id} points at missing node {missing_node_id}")]
    DanglingReference {
        edge_id: String,
        missing_node_id: String,
    },

    #[error("Schema conflict: label '{canonical_label}' seen as {existing} and {incoming}")]
    SchemaConflict {
        canonical_label: String,
        existing: String,
        incoming: String,
    },

    #[error("Embedding dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Graph store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ParlError {
    /// Whether retrying the failed call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ParlError::ProviderUnavailable(_) | ParlError::OpenAI(_) | ParlError::Http(_)
        )
    }

    /// Short machine-readable kind name, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ParlError::ProviderUnavailable(_) => "provider_unavailable",
            ParlError::Segmentation { .. } => "segmentation_error",
            ParlError::EnrichmentDegraded { .. } => "enrichment_degraded",
            ParlError::DanglingReference { .. } => "dangling_reference",
            ParlError::SchemaConflict { .. } => "schema_conflict",
            ParlError::DimensionMismatch { .. } => "dimension_mismatch",
            ParlError::Config(_) => "config",
            ParlError::Store(_) | ParlError::Database(_) => "store",
            ParlError::NotFound(_) => "not_found",
            ParlError::InvalidInput(_) => "invalid_input",
            ParlError::OpenAI(_) | ParlError::Http(_) => "provider_unavailable",
            ParlError::Io(_) => "io",
            ParlError::Json(_) | ParlError::TomlParse(_) => "parse",
        }
    }
}

/// Result type alias for parlgraph operations.
pub type Result<T> = std::result::Result<T, ParlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(ParlError::ProviderUnavailable("quota".into()).is_transient());
        assert!(!ParlError::Segmentation {
            video_id: "v".into(),
            reason: "untimed".into()
        }
        .is_transient());
    }

    #[test]
    fn test_kind_names() {
        let err = ParlError::DanglingReference {
            edge_id: "e1".into(),
            missing_node_id: "n1".into(),
        };
        assert_eq!(err.kind(), "dangling_reference");
        assert!(err.to_string().contains("n1"));
    }
}
