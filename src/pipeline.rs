//! Batch pipeline for parlgraph.
//!
//! Coordinates ingestion, segmentation, extraction, materialization and
//! loading. Videos are prepared concurrently and loaded one at a time, so the
//! store only ever sees a single writer.

use crate::config::{Prompts, Settings};
use crate::enrich::{Embedder, Enricher, OpenAIEmbedder, OpenAISummarizer, RetryPolicy, Summarizer};
use crate::error::{ParlError, Result};
use crate::extract::{ExtractedVideo, Extractor};
use crate::graph::{to_json_ld, to_turtle, ExportFormat, LabelConflict, Materializer};
use crate::ingest::{IngestReport, Ingestor, VideoFailure, VideoPlatform};
use crate::query::QueryEngine;
use crate::segment::Segmenter;
use crate::store::{self, GraphStore, LoadReport, Loader};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A video that went all the way into the graph.
#[derive(Debug, Clone, Serialize)]
pub struct VideoOutcome {
    pub video_id: String,
    pub segments: usize,
    /// Segments appended to an already stored video.
    pub appended_segments: usize,
    pub statements: usize,
    /// Statements stored without a summary or embedding.
    pub degraded: usize,
    pub load: LoadReport,
}

/// Result of one `build` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub processed: Vec<VideoOutcome>,
    /// Already built and not forced.
    pub skipped: Vec<String>,
    pub failed: Vec<VideoFailure>,
    pub conflicts: Vec<LabelConflict>,
}

/// Result of re-embedding the statement set.
#[derive(Debug, Clone, Serialize)]
pub struct ReembedReport {
    pub statements: usize,
    pub embedded: usize,
    pub failed: usize,
    pub dimension: usize,
}

enum Prepared {
    Skip,
    Ready {
        extracted: ExtractedVideo,
        appended: usize,
    },
}

/// The parlgraph build pipeline.
pub struct Pipeline {
    settings: Settings,
    store: Arc<dyn GraphStore>,
    enricher: Enricher,
    segmenter: Segmenter,
    extractor: Extractor,
    materializer: Materializer,
    loader: Loader,
}

impl Pipeline {
    /// Create a pipeline backed by the configured store and OpenAI enrichment.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let summarizer: Arc<dyn Summarizer> = Arc::new(OpenAISummarizer::with_config(
            &settings.enrichment.summary_model,
            prompts,
        )?);
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::with_config(
            &settings.enrichment.embedding_model,
            settings.enrichment.dimensions as usize,
        )?);
        let store = store::open(&settings)?;

        info!(
            "Using {} for summaries and {} for embeddings",
            settings.enrichment.summary_model, settings.enrichment.embedding_model
        );

        Ok(Self::with_components(settings, store, summarizer, embedder))
    }

    /// Create a pipeline with custom components.
    pub fn with_components(
        settings: Settings,
        store: Arc<dyn GraphStore>,
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let enricher = Enricher::from_settings(summarizer, embedder, &settings.enrichment);
        let segmenter = Segmenter::new(settings.segmentation.clone());
        let extractor = Extractor::new(
            enricher.clone(),
            &settings.entities,
            settings.extraction.clone(),
        );
        let materializer = Materializer::new(settings.graph.base_uri.clone());
        let loader = Loader::new(store.clone());

        Self {
            settings,
            store,
            enricher,
            segmenter,
            extractor,
            materializer,
            loader,
        }
    }

    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A query engine over this pipeline's store, embedding with the same
    /// embedder the statements were built with.
    pub fn query_engine(&self) -> QueryEngine {
        QueryEngine::new(
            self.store.clone(),
            self.enricher.embedder(),
            &self.settings.entities,
            self.settings.query.clone(),
        )
    }

    /// Stage 1: fetch and persist raw transcripts.
    pub async fn ingest(
        &self,
        provider: &dyn VideoPlatform,
        ids: &[String],
        force: bool,
    ) -> Result<IngestReport> {
        let policy = RetryPolicy::from_settings(&self.settings.enrichment);
        Ingestor::new(self.store.clone(), policy)
            .ingest(provider, ids, force)
            .await
    }

    /// Stages 2 to 5 over `ids`, or over every ingested video when empty.
    ///
    /// Per-video failures are recorded and the batch continues. A dangling
    /// reference aborts the whole batch with the error.
    #[instrument(skip(self, ids))]
    pub async fn build(&self, ids: &[String], force: bool) -> Result<BatchReport> {
        let ids = if ids.is_empty() {
            self.store.list_raw_video_ids().await?
        } else {
            ids.to_vec()
        };

        let mut report = BatchReport {
            run_id: Uuid::new_v4().to_string(),
            ..Default::default()
        };
        info!("Build {} over {} videos", report.run_id, ids.len());

        let mut prepared: Vec<(usize, String, Result<Prepared>)> =
            stream::iter(ids.into_iter().enumerate())
                .map(|(index, video_id)| async move {
                    let outcome = self.prepare(&video_id, force).await;
                    (index, video_id, outcome)
                })
                .buffer_unordered(self.settings.pipeline.max_concurrent_videos.max(1))
                .collect()
                .await;
        prepared.sort_by_key(|(index, _, _)| *index);

        for (_, video_id, outcome) in prepared {
            let (extracted, appended) = match outcome {
                Ok(Prepared::Skip) => {
                    report.skipped.push(video_id);
                    continue;
                }
                Ok(Prepared::Ready {
                    extracted,
                    appended,
                }) => (extracted, appended),
                Err(e) => {
                    warn!("Failed to build {}: {}", video_id, e);
                    report.failed.push(VideoFailure::new(&video_id, &e));
                    continue;
                }
            };

            match self.commit(&extracted).await {
                Ok(load) => {
                    report.conflicts.extend(load.conflicts.iter().cloned());
                    report.processed.push(VideoOutcome {
                        video_id,
                        segments: extracted.video.segments.len(),
                        appended_segments: appended,
                        statements: extracted.statements.len(),
                        degraded: extracted.degraded_count(),
                        load,
                    });
                }
                Err(e @ ParlError::DanglingReference { .. }) => return Err(e),
                Err(e) => {
                    warn!("Failed to load {}: {}", video_id, e);
                    report.failed.push(VideoFailure::new(&video_id, &e));
                }
            }
        }

        info!(
            "Build {} finished: {} processed, {} skipped, {} failed",
            report.run_id,
            report.processed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Segment and extract one video. Nothing is written here.
    async fn prepare(&self, video_id: &str, force: bool) -> Result<Prepared> {
        let raw = self
            .store
            .get_raw_video(video_id)
            .await?
            .ok_or_else(|| ParlError::NotFound(format!("raw video {} is not ingested", video_id)))?;

        let stored = self.store.get_video(video_id).await?;
        if !force && stored.is_some() && self.store.get_node(video_id).await?.is_some() {
            debug!("Video {} already built", video_id);
            return Ok(Prepared::Skip);
        }

        let fresh = self.segmenter.segment(&raw)?;
        let (video, appended) = match stored {
            Some(mut video) => {
                let appended = video.append_segments(fresh.segments);
                (video, appended)
            }
            None => {
                let count = fresh.segments.len();
                (fresh, count)
            }
        };

        let extracted = self.extractor.extract(&video).await;
        Ok(Prepared::Ready {
            extracted,
            appended,
        })
    }

    /// Materialize and load one extracted video, then record it as built.
    async fn commit(&self, extracted: &ExtractedVideo) -> Result<LoadReport> {
        let batch = self.materializer.materialize(extracted);
        let load = self.loader.load(&batch).await?;
        self.store.put_video(&extracted.video).await?;
        Ok(load)
    }

    /// Re-embed every statement with the configured embedder and record its
    /// dimension as the store's. Statements whose embedding fails are left
    /// without one and stay reachable by keyword.
    #[instrument(skip(self))]
    pub async fn reembed(&self) -> Result<ReembedReport> {
        let statements = self.store.list_statements(None).await?;
        let dimension = self.enricher.embedder().dimensions();

        let vectors: Vec<Option<Vec<f32>>> = stream::iter(statements.iter())
            .map(|s| async move {
                match self.enricher.embed(&s.raw_text).await {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("Re-embedding {} failed: {}", s.statement_id, e);
                        None
                    }
                }
            })
            .buffered(self.settings.enrichment.max_concurrent.max(1))
            .collect()
            .await;

        let embedded = vectors.iter().filter(|v| v.is_some()).count();
        if embedded == 0 && !statements.is_empty() {
            return Err(ParlError::ProviderUnavailable(
                "no statement could be re-embedded; existing embeddings kept".to_string(),
            ));
        }

        self.store.reset_embeddings(dimension).await?;
        for (statement, vector) in statements.iter().zip(&vectors) {
            self.store
                .set_statement_embedding(&statement.statement_id, vector.as_deref())
                .await?;
        }

        info!(
            "Re-embedded {}/{} statements at {} dimensions",
            embedded,
            statements.len(),
            dimension
        );
        Ok(ReembedReport {
            statements: statements.len(),
            embedded,
            failed: statements.len() - embedded,
            dimension,
        })
    }

    /// Serialize one video's graph view.
    pub async fn export_graph(&self, video_id: &str, format: ExportFormat) -> Result<String> {
        let batch = store::video_batch(self.store.as_ref(), video_id).await?;
        let base_uri = &self.settings.graph.base_uri;
        match format {
            ExportFormat::Turtle => Ok(to_turtle(&batch, base_uri)),
            ExportFormat::JsonLd => Ok(serde_json::to_string_pretty(&to_json_ld(&batch, base_uri))?),
        }
    }
}
