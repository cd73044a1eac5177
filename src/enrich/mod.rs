//! Enrichment collaborators: summarization and embedding.
//!
//! Both are modeled as injected traits with a single fallible operation each,
//! so the pipeline can run against deterministic stand-ins. [`Enricher`] wraps
//! them with the retry policy and a concurrency limit on in-flight calls.

mod openai;
mod retry;

pub use openai::{OpenAIEmbedder, OpenAISummarizer};
pub use retry::RetryPolicy;

use crate::config::EnrichmentSettings;
use crate::error::{ParlError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Produces a short summary of a statement.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Rate-limited, retrying access to the enrichment collaborators.
#[derive(Clone)]
pub struct Enricher {
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn Embedder>,
    policy: RetryPolicy,
    limiter: Arc<Semaphore>,
}

impl Enricher {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
        policy: RetryPolicy,
        max_concurrent: usize,
    ) -> Self {
        Self {
            summarizer,
            embedder,
            policy,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn from_settings(
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
        settings: &EnrichmentSettings,
    ) -> Self {
        Self::new(
            summarizer,
            embedder,
            RetryPolicy::from_settings(settings),
            settings.max_concurrent,
        )
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Summarize with retries. A permit is held only while a call is in
    /// flight, and waiting for one does not count against the timeout.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let summarizer = &self.summarizer;
        let limiter = &self.limiter;
        let policy = &self.policy;
        policy
            .retry("summarize", move || async move {
                let _permit = limiter
                    .acquire()
                    .await
                    .map_err(|e| ParlError::ProviderUnavailable(e.to_string()))?;
                let summary = policy.timed("summarize", summarizer.summarize(text)).await?;
                let summary = summary.trim().to_string();
                if summary.is_empty() {
                    return Err(ParlError::ProviderUnavailable(
                        "summarizer returned an empty summary".to_string(),
                    ));
                }
                Ok(summary)
            })
            .await
    }

    /// Embed with retries, rejecting vectors of the wrong dimension.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = &self.embedder;
        let limiter = &self.limiter;
        let policy = &self.policy;
        policy
            .retry("embed", move || async move {
                let _permit = limiter
                    .acquire()
                    .await
                    .map_err(|e| ParlError::ProviderUnavailable(e.to_string()))?;
                let vector = policy.timed("embed", embedder.embed(text)).await?;
                if vector.len() != embedder.dimensions() {
                    return Err(ParlError::ProviderUnavailable(format!(
                        "malformed embedding: expected {} dimensions, got {}",
                        embedder.dimensions(),
                        vector.len()
                    )));
                }
                Ok(vector)
            })
            .await
    }
}
