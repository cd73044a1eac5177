//! Configuration settings for parlgraph.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub segmentation: SegmentationSettings,
    pub extraction: ExtractionSettings,
    pub enrichment: EnrichmentSettings,
    pub entities: EntitySettings,
    pub graph: GraphSettings,
    pub store: StoreSettings,
    pub query: QuerySettings,
    pub pipeline: PipelineSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.parlgraph".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Transcript segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationSettings {
    /// Window length used when the transcript carries no speaker markers.
    pub window_seconds: f64,
    /// Gaps longer than this are kept as explicit silence segments.
    pub gap_threshold_seconds: f64,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            window_seconds: 30.0,
            gap_threshold_seconds: 10.0,
        }
    }
}

/// Statement extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Maximum number of consecutive same-speaker segments folded into one statement.
    pub max_window_segments: usize,
    /// A window stops growing once its text reaches this many characters.
    pub max_statement_chars: usize,
    /// Windows with less text than this are skipped.
    pub min_statement_chars: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            max_window_segments: 3,
            max_statement_chars: 1200,
            min_statement_chars: 1,
        }
    }
}

/// Summarization/embedding collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Chat model used for statement summaries.
    pub summary_model: String,
    /// Embedding model.
    pub embedding_model: String,
    /// Embedding dimensions (fixed for the lifetime of a store).
    pub dimensions: u32,
    /// Attempts per call, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on a single backoff, in milliseconds.
    pub max_backoff_ms: u64,
    /// Per-call timeout in seconds.
    pub timeout_seconds: u64,
    /// Maximum in-flight enrichment calls.
    pub max_concurrent: usize,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            summary_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            timeout_seconds: 60,
            max_concurrent: 4,
        }
    }
}

/// Entity normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySettings {
    /// Known aliases, keyed by normalized alias, valued by canonical label.
    pub aliases: HashMap<String, String>,
    /// Topic lexicon matched against statement text.
    pub topics: Vec<String>,
}

impl Default for EntitySettings {
    fn default() -> Self {
        let aliases = [
            ("health ministry", "ministry of health"),
            ("ministry of health and family welfare", "ministry of health"),
            ("finance ministry", "ministry of finance"),
            ("home ministry", "ministry of home affairs"),
            ("covid", "covid-19"),
            ("coronavirus", "covid-19"),
            ("vaccine", "vaccination"),
            ("vaccines", "vaccination"),
            ("hospital beds", "hospital capacity"),
            ("bed capacity", "hospital capacity"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let topics = [
            "covid-19",
            "vaccination",
            "hospital capacity",
            "healthcare",
            "budget",
            "taxation",
            "education",
            "agriculture",
            "farmers",
            "defence",
            "railways",
            "inflation",
            "unemployment",
            "infrastructure",
            "climate change",
            "water supply",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self { aliases, topics }
    }
}

/// Graph serialization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Base URI for minted node URIs; must end with '/'.
    pub base_uri: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_uri: "https://parlgraph.org/id/".to_string(),
        }
    }
}

/// Graph store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.parlgraph/graph.db".to_string(),
        }
    }
}

/// Query engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Number of statements retrieved per query.
    pub top_k: usize,
    /// Minimum cosine similarity for a vector hit.
    pub min_score: f32,
    /// Hits from the same video closer than this are treated as duplicates.
    pub dedup_window_seconds: f64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: 0.0,
            dedup_window_seconds: 5.0,
        }
    }
}

/// Batch pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Videos segmented/extracted concurrently.
    pub max_concurrent_videos: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_videos: 4,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ParlError;

        if self.segmentation.window_seconds <= 0.0 {
            return Err(ParlError::Config(
                "segmentation.window_seconds must be positive".to_string(),
            ));
        }
        if self.enrichment.max_attempts == 0 {
            return Err(ParlError::Config(
                "enrichment.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.enrichment.max_concurrent == 0 || self.pipeline.max_concurrent_videos == 0 {
            return Err(ParlError::Config(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if !self.graph.base_uri.ends_with('/') {
            return Err(ParlError::Config(
                "graph.base_uri must end with '/'".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ParlError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parlgraph")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [query]
            top_k = 3

            [entities.aliases]
            "dept of health" = "ministry of health"
            "#,
        )
        .unwrap();

        assert_eq!(settings.query.top_k, 3);
        assert_eq!(settings.query.dedup_window_seconds, 5.0);
        assert_eq!(settings.enrichment.max_attempts, 3);
        assert_eq!(
            settings.entities.aliases.get("dept of health").map(String::as_str),
            Some("ministry of health")
        );
    }

    #[test]
    fn test_invalid_base_uri_rejected() {
        let mut settings = Settings::default();
        settings.graph.base_uri = "https://example.org/id".to_string();
        assert!(settings.validate().is_err());
    }
}
