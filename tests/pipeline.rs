//! End-to-end build and query runs over in-process stores.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parlgraph::config::Settings;
use parlgraph::enrich::{Embedder, Summarizer};
use parlgraph::graph::{ids, labels, Edge, Node, NodeType, Statement};
use parlgraph::ingest::{JsonFileProvider, PlatformVideo, RawVideo, TranscriptCue, VideoPlatform};
use parlgraph::pipeline::Pipeline;
use parlgraph::query::{MatchKind, SearchFilters};
use parlgraph::segment::Video;
use parlgraph::store::{
    GraphStore, HistoryEntry, MemoryGraphStore, SqliteGraphStore, StatementFilter, StatementHit,
    StoreStats, UpsertOutcome,
};
use parlgraph::{ParlError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

struct FirstSentence;

#[async_trait]
impl Summarizer for FirstSentence {
    async fn summarize(&self, text: &str) -> Result<String> {
        Ok(text.split('.').next().unwrap_or(text).trim().to_string())
    }
}

/// One axis per theme plus a constant, so related texts score higher.
struct ThemeEmbedder;

#[async_trait]
impl Embedder for ThemeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        Ok(vec![
            if text.contains("vaccin") { 1.0 } else { 0.0 },
            if text.contains("bed") { 1.0 } else { 0.0 },
            0.1,
        ])
    }

    fn dimensions(&self) -> usize {
        3
    }
}

struct UnreachableEmbedder;

#[async_trait]
impl Embedder for UnreachableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(ParlError::ProviderUnavailable("embedding service down".into()))
    }

    fn dimensions(&self) -> usize {
        3
    }
}

struct Platform {
    videos: BTreeMap<String, PlatformVideo>,
}

#[async_trait]
impl VideoPlatform for Platform {
    fn name(&self) -> &str {
        "test"
    }

    async fn list_videos(&self) -> Result<Vec<String>> {
        Ok(self.videos.keys().cloned().collect())
    }

    async fn fetch_video(&self, video_id: &str) -> Result<PlatformVideo> {
        self.videos
            .get(video_id)
            .cloned()
            .ok_or_else(|| ParlError::NotFound(video_id.to_string()))
    }
}

fn video(video_id: &str, day: u32, speaker: &str, text: &str) -> PlatformVideo {
    PlatformVideo {
        video_id: video_id.to_string(),
        published_at: Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).single(),
        title: format!("Question Hour {}", video_id),
        channel: Some("Sansad TV".to_string()),
        language: Some("en".to_string()),
        source_uri: None,
        transcript_segments: vec![TranscriptCue {
            start_ts: Some(0.0),
            end_ts: Some(12.0),
            speaker_raw: Some(speaker.to_string()),
            text: text.to_string(),
        }],
        transcript_text: None,
    }
}

fn platform() -> Platform {
    let v1 = video(
        "vid00000001",
        5,
        "Dr. X",
        "Minister of Health discusses COVID-19 vaccination rollout",
    );
    let v2 = video(
        "vid00000002",
        6,
        "Shri Y",
        "Minister of Health outlines hospital bed capacity",
    );
    Platform {
        videos: BTreeMap::from([(v1.video_id.clone(), v1), (v2.video_id.clone(), v2)]),
    }
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.enrichment.max_attempts = 1;
    settings
}

fn stores() -> Vec<Arc<dyn GraphStore>> {
    vec![
        Arc::new(MemoryGraphStore::new()),
        Arc::new(SqliteGraphStore::in_memory().unwrap()),
    ]
}

async fn built(store: Arc<dyn GraphStore>, embedder: Arc<dyn Embedder>) -> Pipeline {
    let pipeline = Pipeline::with_components(settings(), store, Arc::new(FirstSentence), embedder);
    let ingested = pipeline.ingest(&platform(), &[], false).await.unwrap();
    assert_eq!(ingested.ingested.len(), 2);

    let report = pipeline.build(&[], false).await.unwrap();
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.processed.len(), 2);
    pipeline
}

#[tokio::test]
async fn test_semantic_search_ranks_matching_statement_first() {
    for store in stores() {
        let pipeline = built(store, Arc::new(ThemeEmbedder)).await;
        let results = pipeline
            .query_engine()
            .search("COVID vaccination", &SearchFilters::default())
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].video_id, "vid00000001");
        assert_eq!(results[0].speaker.as_deref(), Some("Dr. X"));
        assert_eq!(results[0].matched_by, MatchKind::Vector);
        assert!(results[0].score > results[1].score);
        assert!(results[0]
            .video_uri_with_timestamp
            .starts_with("https://www.youtube.com/watch?v=vid00000001"));
    }
}

#[tokio::test]
async fn test_shared_ministry_is_one_node() {
    for store in stores() {
        let pipeline = built(store.clone(), Arc::new(ThemeEmbedder)).await;
        let ministry_id = ids::entity_node_id(NodeType::Ministry, "ministry of health");

        let ministries = store.list_nodes(Some(NodeType::Ministry)).await.unwrap();
        assert_eq!(ministries.len(), 1);
        assert_eq!(ministries[0].node_id, ministry_id);

        let statements = store.list_statements(None).await.unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements
            .iter()
            .all(|s| s.ministry_id.as_deref() == Some(ministry_id.as_str())));

        let hits = pipeline
            .query_engine()
            .lookup_entity(NodeType::Ministry, "Health Ministry")
            .await;
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.matched_by == MatchKind::Entity));
    }
}

#[tokio::test]
async fn test_every_reference_resolves() {
    for store in stores() {
        built(store.clone(), Arc::new(ThemeEmbedder)).await;

        for edge in store.list_edges().await.unwrap() {
            assert!(store.get_node(&edge.source_node_id).await.unwrap().is_some());
            assert!(store.get_node(&edge.target_node_id).await.unwrap().is_some());
        }
        for statement in store.list_statements(None).await.unwrap() {
            for id in [&statement.speaker_id, &statement.ministry_id].into_iter().flatten() {
                assert!(store.get_node(id).await.unwrap().is_some(), "missing {}", id);
            }
            assert!(store.get_node(&statement.video_id).await.unwrap().is_some());

            let range = statement.segment_range;
            assert_eq!(
                statement.statement_id,
                ids::statement_id(&statement.video_id, range.first, range.last)
            );
        }

        let spoken_by = store
            .list_edges()
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.label == labels::SPOKEN_BY)
            .count();
        assert_eq!(spoken_by, 2);
    }
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    for store in stores() {
        let pipeline = built(store.clone(), Arc::new(ThemeEmbedder)).await;
        let before = store.stats().await.unwrap();

        let skipped = pipeline.build(&[], false).await.unwrap();
        assert_eq!(skipped.skipped.len(), 2);
        assert!(skipped.processed.is_empty());

        let forced = pipeline.build(&[], true).await.unwrap();
        assert_eq!(forced.processed.len(), 2);
        for outcome in &forced.processed {
            assert!(outcome.load.is_noop(), "{:?}", outcome.load);
            assert_eq!(outcome.appended_segments, 0);
        }

        let after = store.stats().await.unwrap();
        assert_eq!(before.statements, after.statements);
        assert_eq!(before.edges, after.edges);
        assert_eq!(before.nodes(), after.nodes());
        assert_eq!(before.history_entries, after.history_entries);
    }
}

#[tokio::test]
async fn test_shared_speaker_survives_forced_rebuild_unchanged() {
    let v1 = video("vid00000001", 5, "Dr. X", "Minister of Health discusses vaccination");
    let v2 = video("vid00000002", 6, "DR. X", "Minister of Finance presents the budget");
    let platform = Platform {
        videos: BTreeMap::from([(v1.video_id.clone(), v1), (v2.video_id.clone(), v2)]),
    };

    for store in stores() {
        let pipeline =
            Pipeline::with_components(settings(), store.clone(), Arc::new(FirstSentence), Arc::new(ThemeEmbedder));
        pipeline.ingest(&platform, &[], false).await.unwrap();
        pipeline.build(&[], false).await.unwrap();

        let speakers = store.list_nodes(Some(NodeType::Speaker)).await.unwrap();
        assert_eq!(speakers.len(), 1);
        let history = store.stats().await.unwrap().history_entries;

        for _ in 0..2 {
            let forced = pipeline.build(&[], true).await.unwrap();
            assert!(forced.processed.iter().all(|o| o.load.is_noop()));
        }
        assert_eq!(store.stats().await.unwrap().history_entries, history);

        let speaker = store.get_node(&speakers[0].node_id).await.unwrap().unwrap();
        assert_eq!(speaker.version, speakers[0].version);
        assert_eq!(speaker.display_name(), "Dr. X");
    }
}

#[tokio::test]
async fn test_segmentation_failure_is_isolated() {
    let mut platform = platform();
    let mut untimed = video("vid00000009", 7, "Shri Z", "Minister of Health on oxygen supply");
    untimed.transcript_segments[0].start_ts = None;
    platform.videos.insert(untimed.video_id.clone(), untimed);

    for store in stores() {
        let pipeline =
            Pipeline::with_components(settings(), store.clone(), Arc::new(FirstSentence), Arc::new(ThemeEmbedder));
        pipeline.ingest(&platform, &[], false).await.unwrap();

        let report = pipeline.build(&[], false).await.unwrap();
        assert_eq!(report.processed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].video_id, "vid00000009");
        assert_eq!(report.failed[0].kind, "segmentation_error");

        assert!(store.get_node("vid00000009").await.unwrap().is_none());
        assert!(store.list_statements(Some("vid00000009")).await.unwrap().is_empty());
        assert_eq!(store.list_statements(None).await.unwrap().len(), 2);
    }
}

/// Memory store that accepts speaker nodes without keeping them.
struct SpeakerlessStore {
    inner: MemoryGraphStore,
}

#[async_trait]
impl GraphStore for SpeakerlessStore {
    async fn put_raw_video(&self, raw: &RawVideo) -> Result<bool> {
        self.inner.put_raw_video(raw).await
    }

    async fn get_raw_video(&self, video_id: &str) -> Result<Option<RawVideo>> {
        self.inner.get_raw_video(video_id).await
    }

    async fn list_raw_video_ids(&self) -> Result<Vec<String>> {
        self.inner.list_raw_video_ids().await
    }

    async fn put_video(&self, video: &Video) -> Result<()> {
        self.inner.put_video(video).await
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        self.inner.get_video(video_id).await
    }

    async fn list_videos(&self) -> Result<Vec<Video>> {
        self.inner.list_videos().await
    }

    async fn upsert_node(&self, node: &Node) -> Result<UpsertOutcome> {
        if node.node_type == NodeType::Speaker {
            return Ok(UpsertOutcome::Inserted);
        }
        self.inner.upsert_node(node).await
    }

    async fn upsert_edge(&self, edge: &Edge) -> Result<UpsertOutcome> {
        self.inner.upsert_edge(edge).await
    }

    async fn upsert_statement(&self, statement: &Statement) -> Result<UpsertOutcome> {
        self.inner.upsert_statement(statement).await
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>> {
        self.inner.get_node(node_id).await
    }

    async fn find_nodes_by_label(&self, canonical_label: &str) -> Result<Vec<Node>> {
        self.inner.find_nodes_by_label(canonical_label).await
    }

    async fn list_nodes(&self, node_type: Option<NodeType>) -> Result<Vec<Node>> {
        self.inner.list_nodes(node_type).await
    }

    async fn list_edges(&self) -> Result<Vec<Edge>> {
        self.inner.list_edges().await
    }

    async fn edges_from(&self, node_id: &str) -> Result<Vec<Edge>> {
        self.inner.edges_from(node_id).await
    }

    async fn edges_to(&self, node_id: &str) -> Result<Vec<Edge>> {
        self.inner.edges_to(node_id).await
    }

    async fn get_statement(&self, statement_id: &str) -> Result<Option<Statement>> {
        self.inner.get_statement(statement_id).await
    }

    async fn list_statements(&self, video_id: Option<&str>) -> Result<Vec<Statement>> {
        self.inner.list_statements(video_id).await
    }

    async fn history(&self, record_id: &str) -> Result<Vec<HistoryEntry>> {
        self.inner.history(record_id).await
    }

    async fn nearest_statements(
        &self,
        query: &[f32],
        filter: &StatementFilter,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<StatementHit>> {
        self.inner.nearest_statements(query, filter, limit, min_score).await
    }

    async fn keyword_candidates(
        &self,
        terms: &[String],
        filter: &StatementFilter,
        limit: usize,
    ) -> Result<Vec<Statement>> {
        self.inner.keyword_candidates(terms, filter, limit).await
    }

    async fn embedding_dimension(&self) -> Result<Option<usize>> {
        self.inner.embedding_dimension().await
    }

    async fn reset_embeddings(&self, dimension: usize) -> Result<()> {
        self.inner.reset_embeddings(dimension).await
    }

    async fn set_statement_embedding(&self, statement_id: &str, embedding: Option<&[f32]>) -> Result<()> {
        self.inner.set_statement_embedding(statement_id, embedding).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }
}

#[tokio::test]
async fn test_dangling_reference_aborts_build() {
    let store: Arc<dyn GraphStore> = Arc::new(SpeakerlessStore {
        inner: MemoryGraphStore::new(),
    });
    let pipeline =
        Pipeline::with_components(settings(), store.clone(), Arc::new(FirstSentence), Arc::new(ThemeEmbedder));
    pipeline.ingest(&platform(), &[], false).await.unwrap();

    let err = pipeline.build(&[], false).await.unwrap_err();
    assert!(matches!(err, ParlError::DanglingReference { .. }), "{}", err);

    // The first video stopped at its speaker edge; nothing after it ran.
    assert!(store.get_video("vid00000001").await.unwrap().is_none());
    assert!(store.get_node("vid00000002").await.unwrap().is_none());
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_keyword_search() {
    for store in stores() {
        let pipeline = built(store.clone(), Arc::new(UnreachableEmbedder)).await;

        let statements = store.list_statements(None).await.unwrap();
        assert!(statements.iter().all(|s| s.embedding_vector.is_none()));
        assert!(statements.iter().all(|s| s.summary_text.is_some()));

        let results = pipeline
            .query_engine()
            .search("vaccination rollout", &SearchFilters::default())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].video_id, "vid00000001");
        assert_eq!(results[0].matched_by, MatchKind::Keyword);
    }
}

#[tokio::test]
async fn test_reembed_replaces_dimension() {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
    built(store.clone(), Arc::new(UnreachableEmbedder)).await;

    let pipeline = Pipeline::with_components(
        settings(),
        store.clone(),
        Arc::new(FirstSentence),
        Arc::new(ThemeEmbedder),
    );
    let report = pipeline.reembed().await.unwrap();
    assert_eq!(report.embedded, 2);
    assert_eq!(report.dimension, 3);
    assert_eq!(store.embedding_dimension().await.unwrap(), Some(3));

    let results = pipeline
        .query_engine()
        .search("vaccination", &SearchFilters::default())
        .await;
    assert_eq!(results[0].matched_by, MatchKind::Vector);
}

#[tokio::test]
async fn test_ingest_from_json_directory() {
    let dir = tempfile::tempdir().unwrap();
    let record = serde_json::json!({
        "video_id": "vid00000003",
        "title": "Lok Sabha 2024-07-22",
        "transcript": [
            {"text": "Speaker: The house will come to order.", "start": 0.0, "duration": 4.0},
            {"text": "Minister of Health discusses vaccination camps.", "start": 4.0, "duration": 6.0}
        ]
    });
    std::fs::write(dir.path().join("vid00000003.json"), record.to_string()).unwrap();

    let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
    let pipeline = Pipeline::with_components(
        settings(),
        store.clone(),
        Arc::new(FirstSentence),
        Arc::new(ThemeEmbedder),
    );

    let provider = JsonFileProvider::new(dir.path());
    let report = pipeline.ingest(&provider, &[], false).await.unwrap();
    assert_eq!(report.ingested, vec!["vid00000003".to_string()]);

    let again = pipeline.ingest(&provider, &[], false).await.unwrap();
    assert!(again.ingested.is_empty());

    pipeline.build(&[], false).await.unwrap();
    let video = store.get_video("vid00000003").await.unwrap().unwrap();
    assert_eq!(video.session_date.map(|d| d.to_string()).as_deref(), Some("2024-07-22"));
    assert!(!store.list_statements(Some("vid00000003")).await.unwrap().is_empty());
}
