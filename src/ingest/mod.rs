//! Transcript ingestion.
//!
//! Fetches per-video transcripts from a [`VideoPlatform`], normalizes text and
//! language tags, and persists them as append-only [`RawVideo`] records.

mod local;
mod normalize;
mod youtube;

pub use local::JsonFileProvider;
pub use normalize::{clean_text, normalize_language};
pub use youtube::{extract_video_id, uri_with_timestamp, watch_url};

use crate::enrich::RetryPolicy;
use crate::error::{ParlError, Result};
use crate::store::GraphStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One timed piece of transcript as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptCue {
    pub start_ts: Option<f64>,
    pub end_ts: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_raw: Option<String>,
    pub text: String,
}

/// A video as returned by the platform collaborator, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformVideo {
    pub video_id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub title: String,
    pub channel: Option<String>,
    pub language: Option<String>,
    pub source_uri: Option<String>,
    /// Timed cues, in platform order.
    pub transcript_segments: Vec<TranscriptCue>,
    /// Untimed or line-timed transcript text, used when no cues are available.
    pub transcript_text: Option<String>,
}

impl PlatformVideo {
    pub fn has_transcript(&self) -> bool {
        !self.transcript_segments.is_empty()
            || self
                .transcript_text
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }
}

/// Immutable ingested transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVideo {
    pub video_id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_transcript_text: String,
    pub language: String,
    pub source_uri: String,
    pub title: String,
    pub channel: Option<String>,
    /// Cleaned cues; empty when the transcript arrived as plain text.
    pub cues: Vec<TranscriptCue>,
}

impl RawVideo {
    /// Normalize a platform record into a raw video.
    pub fn from_platform(video: PlatformVideo) -> Self {
        let cues: Vec<TranscriptCue> = video
            .transcript_segments
            .into_iter()
            .map(|cue| TranscriptCue {
                start_ts: cue.start_ts,
                end_ts: cue.end_ts,
                speaker_raw: cue
                    .speaker_raw
                    .map(|s| clean_text(&s))
                    .filter(|s| !s.is_empty()),
                text: clean_text(&cue.text),
            })
            .filter(|cue| !cue.text.is_empty())
            .collect();

        let raw_transcript_text = if cues.is_empty() {
            video
                .transcript_text
                .as_deref()
                .map(|text| {
                    text.lines()
                        .map(clean_text)
                        .filter(|line| !line.is_empty())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default()
        } else {
            cues.iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };

        let source_uri = video
            .source_uri
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| watch_url(&video.video_id));

        Self {
            language: normalize_language(video.language.as_deref().unwrap_or("")),
            title: clean_text(&video.title),
            channel: video.channel.map(|c| clean_text(&c)),
            video_id: video.video_id,
            published_at: video.published_at,
            raw_transcript_text,
            source_uri,
            cues,
        }
    }
}

/// Source of raw transcripts.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Ids of every video the provider can deliver.
    async fn list_videos(&self) -> Result<Vec<String>>;

    /// Fetch one video with its transcript.
    async fn fetch_video(&self, video_id: &str) -> Result<PlatformVideo>;
}

/// A unit of work that failed, with the error kind that stopped it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFailure {
    pub video_id: String,
    pub kind: String,
    pub message: String,
}

impl VideoFailure {
    pub fn new(video_id: &str, error: &ParlError) -> Self {
        Self {
            video_id: video_id.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub ingested: Vec<String>,
    /// Already present and not forced, or forced but identical.
    pub skipped: Vec<String>,
    pub failed: Vec<VideoFailure>,
}

/// Fetches and persists raw transcripts.
pub struct Ingestor {
    store: Arc<dyn GraphStore>,
    policy: RetryPolicy,
}

impl Ingestor {
    pub fn new(store: Arc<dyn GraphStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Ingest `ids`, or every video the provider lists when `ids` is empty.
    ///
    /// A failing video is recorded and the run continues with the next one.
    #[instrument(skip(self, provider, ids), fields(provider = provider.name()))]
    pub async fn ingest(
        &self,
        provider: &dyn VideoPlatform,
        ids: &[String],
        force: bool,
    ) -> Result<IngestReport> {
        let ids = if ids.is_empty() {
            self.policy
                .run("list videos", || provider.list_videos())
                .await?
        } else {
            ids.to_vec()
        };

        let mut report = IngestReport::default();
        for video_id in ids {
            match self.ingest_one(provider, &video_id, force).await {
                Ok(true) => report.ingested.push(video_id),
                Ok(false) => report.skipped.push(video_id),
                Err(e) => {
                    warn!("Failed to ingest {}: {}", video_id, e);
                    report.failed.push(VideoFailure::new(&video_id, &e));
                }
            }
        }

        info!(
            "Ingested {} videos ({} skipped, {} failed)",
            report.ingested.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn ingest_one(
        &self,
        provider: &dyn VideoPlatform,
        video_id: &str,
        force: bool,
    ) -> Result<bool> {
        if !force && self.store.get_raw_video(video_id).await?.is_some() {
            debug!("Raw video {} already ingested", video_id);
            return Ok(false);
        }

        let fetched = self
            .policy
            .run("fetch video", || provider.fetch_video(video_id))
            .await?;

        if !fetched.has_transcript() {
            return Err(ParlError::NotFound(format!(
                "no transcript available for video {}",
                video_id
            )));
        }

        let raw = RawVideo::from_platform(fetched);
        if raw.video_id != video_id {
            return Err(ParlError::InvalidInput(format!(
                "provider returned video {} when asked for {}",
                raw.video_id, video_id
            )));
        }

        self.store.put_raw_video(&raw).await
    }
}
