//! Semantic extraction.
//!
//! Groups a video's segments into statement windows, resolves the entities
//! each statement mentions, and enriches it with a summary and an embedding.
//! Enrichment failures degrade the statement instead of dropping it.

mod entities;
mod normalize;

pub use entities::{EntityMatcher, Mention};
pub use normalize::{display_case, normalize_label, EntityResolver};

use crate::config::{EntitySettings, ExtractionSettings};
use crate::enrich::Enricher;
use crate::error::ParlError;
use crate::graph::{ids, NodeType, SegmentRange, Statement};
use crate::segment::{Segment, Video, UNKNOWN_SPEAKER};
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

/// A canonicalized reference to an entity node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub node_type: NodeType,
    pub canonical_label: String,
    /// Name as it should be shown to people.
    pub display_name: String,
}

impl EntityRef {
    pub fn node_id(&self) -> String {
        ids::entity_node_id(self.node_type, &self.canonical_label)
    }
}

/// A statement with the entity references extracted from it.
#[derive(Debug, Clone)]
pub struct ExtractedStatement {
    pub statement: Statement,
    pub speaker: Option<EntityRef>,
    pub ministry: Option<EntityRef>,
    pub topics: Vec<EntityRef>,
    pub bills: Vec<EntityRef>,
    /// Why enrichment degraded, if it did.
    pub degraded: Vec<String>,
}

/// All statements extracted from one video, in video order.
#[derive(Debug, Clone)]
pub struct ExtractedVideo {
    pub video: Video,
    pub statements: Vec<ExtractedStatement>,
}

impl ExtractedVideo {
    pub fn degraded_count(&self) -> usize {
        self.statements.iter().filter(|s| !s.degraded.is_empty()).count()
    }
}

/// Derives statements and entity references from segmented videos.
pub struct Extractor {
    enricher: Enricher,
    matcher: EntityMatcher,
    settings: ExtractionSettings,
}

impl Extractor {
    pub fn new(enricher: Enricher, entities: &EntitySettings, settings: ExtractionSettings) -> Self {
        let resolver = EntityResolver::new(&entities.aliases);
        Self {
            enricher,
            matcher: EntityMatcher::new(resolver, &entities.topics),
            settings,
        }
    }

    /// Statement windows over the segments: runs of consecutive speech by one
    /// speaker, capped by segment count and text length. Silence always breaks
    /// a window.
    pub fn windows(&self, segments: &[Segment]) -> Vec<SegmentRange> {
        let max_segments = self.settings.max_window_segments.max(1);
        let mut windows = Vec::new();
        let mut open: Option<(SegmentRange, usize)> = None;

        for (i, seg) in segments.iter().enumerate() {
            if seg.is_silence() {
                windows.extend(open.take().map(|(range, _)| range));
                continue;
            }

            if let Some((range, chars)) = open.as_mut() {
                let same_speaker = segments[range.first].speaker_raw == seg.speaker_raw;
                let fits = range.last - range.first + 1 < max_segments
                    && *chars < self.settings.max_statement_chars;
                if same_speaker && fits {
                    range.last = i;
                    *chars += seg.text.len() + 1;
                    continue;
                }
                windows.extend(open.take().map(|(range, _)| range));
            }
            open = Some((SegmentRange { first: i, last: i }, seg.text.len()));
        }
        windows.extend(open.map(|(range, _)| range));

        windows
            .into_iter()
            .filter(|range| window_text(segments, *range).trim().len() >= self.settings.min_statement_chars)
            .collect()
    }

    /// Extract every statement of a video. Never fails: enrichment problems
    /// leave the statement with null summary and embedding.
    #[instrument(skip(self, video), fields(video_id = %video.video_id))]
    pub async fn extract(&self, video: &Video) -> ExtractedVideo {
        let windows = self.windows(&video.segments);
        debug!("{} statement windows", windows.len());

        let statements = join_all(
            windows
                .into_iter()
                .map(|range| self.extract_window(video, range)),
        )
        .await;

        let extracted = ExtractedVideo {
            video: video.clone(),
            statements,
        };
        info!(
            "Extracted {} statements from {} ({} degraded)",
            extracted.statements.len(),
            video.video_id,
            extracted.degraded_count()
        );
        extracted
    }

    async fn extract_window(&self, video: &Video, range: SegmentRange) -> ExtractedStatement {
        let segments = &video.segments[range.first..=range.last];
        let raw_text = window_text(&video.segments, range);
        let speaker_raw = segments[0].speaker_raw.as_str();
        let statement_id = ids::statement_id(&video.video_id, range.first, range.last);

        let speaker = self.entity(NodeType::Speaker, speaker_raw, speaker_raw.trim().to_string());
        let ministry = self
            .matcher
            .ministry(&raw_text)
            .map(|m| m.canonical_label)
            .or_else(|| {
                let hint = video.ministry_hint.as_deref()?;
                self.matcher.resolver().canonicalize(NodeType::Ministry, hint)
            })
            .map(|label| self.entity_from_label(NodeType::Ministry, label));
        let topics = self
            .matcher
            .topics(&raw_text)
            .into_iter()
            .map(|m| self.entity_from_label(NodeType::Topic, m.canonical_label))
            .collect();
        let bills = self
            .matcher
            .bills(&raw_text)
            .into_iter()
            .filter_map(|m| self.entity(NodeType::Bill, &m.surface, m.surface.clone()))
            .collect();

        let prompt_text = if speaker_raw == UNKNOWN_SPEAKER {
            raw_text.clone()
        } else {
            format!("{}: {}", speaker_raw, raw_text)
        };
        let (summary, embedding) = tokio::join!(
            self.enricher.summarize(&prompt_text),
            self.enricher.embed(&raw_text)
        );

        let mut degraded = Vec::new();
        let summary_text = summary
            .map_err(|e| degraded.push(format!("summary: {}", e)))
            .ok();
        let embedding_vector = embedding
            .map_err(|e| degraded.push(format!("embedding: {}", e)))
            .ok();
        if !degraded.is_empty() {
            let err = ParlError::EnrichmentDegraded {
                statement_id: statement_id.clone(),
                reason: degraded.join("; "),
            };
            warn!("{}", err);
        }

        let statement = Statement {
            statement_id,
            video_id: video.video_id.clone(),
            segment_range: range,
            start_ts: segments[0].start_ts,
            end_ts: segments[segments.len() - 1].end_ts,
            speaker_id: speaker.as_ref().map(EntityRef::node_id),
            ministry_id: ministry.as_ref().map(EntityRef::node_id),
            summary_text,
            embedding_vector,
            raw_text,
            version: 1,
            updated_at: Utc::now(),
        };

        ExtractedStatement {
            statement,
            speaker,
            ministry,
            topics,
            bills,
            degraded,
        }
    }

    fn entity(&self, node_type: NodeType, raw: &str, display_name: String) -> Option<EntityRef> {
        let canonical_label = self.matcher.resolver().canonicalize(node_type, raw)?;
        Some(EntityRef {
            node_type,
            canonical_label,
            display_name,
        })
    }

    fn entity_from_label(&self, node_type: NodeType, canonical_label: String) -> EntityRef {
        EntityRef {
            node_type,
            display_name: display_case(&canonical_label),
            canonical_label,
        }
    }
}

fn window_text(segments: &[Segment], range: SegmentRange) -> String {
    segments[range.first..=range.last]
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{Embedder, RetryPolicy, Summarizer};
    use crate::error::Result;
    use crate::segment::SegmentKind;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FirstWords;

    #[async_trait]
    impl Summarizer for FirstWords {
        async fn summarize(&self, text: &str) -> Result<String> {
            Ok(text.split_whitespace().take(4).collect::<Vec<_>>().join(" "))
        }
    }

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct Unavailable;

    #[async_trait]
    impl Embedder for Unavailable {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(ParlError::ProviderUnavailable("quota exceeded".into()))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn speech(start: f64, speaker: &str, text: &str) -> Segment {
        Segment {
            start_ts: start,
            end_ts: start + 5.0,
            speaker_raw: speaker.to_string(),
            text: text.to_string(),
            kind: SegmentKind::Speech,
        }
    }

    fn video(segments: Vec<Segment>) -> Video {
        Video {
            video_id: "v1".to_string(),
            title: "Question Hour".to_string(),
            channel: None,
            published_at: None,
            source_uri: String::new(),
            language: "en".to_string(),
            session_date: None,
            ministry_hint: Some("Health Ministry".to_string()),
            segments,
        }
    }

    fn extractor(embedder: Arc<dyn Embedder>) -> Extractor {
        let enricher = Enricher::new(Arc::new(FirstWords), embedder, RetryPolicy::immediate(3), 2);
        Extractor::new(enricher, &EntitySettings::default(), ExtractionSettings::default())
    }

    #[test]
    fn test_windows_respect_speaker_silence_and_size() {
        let ex = extractor(Arc::new(LengthEmbedder));
        let mut segments = vec![
            speech(0.0, "A", "one"),
            speech(5.0, "A", "two"),
            speech(10.0, "A", "three"),
            speech(15.0, "A", "four"),
            speech(20.0, "B", "five"),
        ];
        segments.push(Segment {
            start_ts: 25.0,
            end_ts: 60.0,
            speaker_raw: String::new(),
            text: String::new(),
            kind: SegmentKind::Silence,
        });
        segments.push(speech(60.0, "B", "six"));

        let windows = ex.windows(&segments);
        let bounds: Vec<(usize, usize)> = windows.iter().map(|r| (r.first, r.last)).collect();
        assert_eq!(bounds, vec![(0, 2), (3, 3), (4, 4), (6, 6)]);
    }

    #[tokio::test]
    async fn test_extract_resolves_entities() {
        let ex = extractor(Arc::new(LengthEmbedder));
        let v = video(vec![speech(
            0.0,
            "Dr. X",
            "Minister of Health discusses COVID-19 vaccination rollout",
        )]);

        let out = ex.extract(&v).await;
        assert_eq!(out.statements.len(), 1);
        let s = &out.statements[0];
        assert_eq!(s.speaker.as_ref().map(|e| e.display_name.as_str()), Some("Dr. X"));
        assert_eq!(
            s.ministry.as_ref().map(|e| e.canonical_label.as_str()),
            Some("ministry of health")
        );
        assert_eq!(s.topics.len(), 2);
        assert_eq!(s.statement.summary_text.as_deref(), Some("Dr. X: Minister of"));
        assert_eq!(s.statement.statement_id, ids::statement_id("v1", 0, 0));
        assert!(s.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_ministry_falls_back_to_title_hint() {
        let ex = extractor(Arc::new(LengthEmbedder));
        let out = ex
            .extract(&video(vec![speech(0.0, "unknown", "We have added beds")]))
            .await;
        let s = &out.statements[0];
        assert!(s.speaker.is_none());
        assert_eq!(
            s.ministry.as_ref().map(|e| e.canonical_label.as_str()),
            Some("ministry of health")
        );
    }

    #[tokio::test]
    async fn test_failed_embedding_degrades_statement() {
        let ex = extractor(Arc::new(Unavailable));
        let out = ex
            .extract(&video(vec![speech(0.0, "A", "statement text")]))
            .await;

        assert_eq!(out.statements.len(), 1);
        let s = &out.statements[0];
        assert!(s.statement.embedding_vector.is_none());
        assert!(s.statement.summary_text.is_some());
        assert_eq!(s.degraded.len(), 1);
        assert_eq!(out.degraded_count(), 1);
    }
}
