//! Semantic query engine.
//!
//! Embeds a free-text query, retrieves the nearest statements and expands each
//! hit one hop to its speaker, ministry and video. Statements stored without
//! an embedding are reached through the keyword and entity paths instead.
//!
//! Nothing in here returns an error to the caller: a failing store or
//! embedder yields fewer results, never a failed query.

use crate::config::{EntitySettings, QuerySettings};
use crate::enrich::Embedder;
use crate::error::Result;
use crate::extract::EntityResolver;
use crate::graph::{ids, labels, Node, NodeType, Statement};
use crate::ingest::uri_with_timestamp;
use crate::store::{term_coverage, GraphStore, StatementFilter};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Candidates fetched per requested result, leaving room for de-duplication.
const OVERFETCH: usize = 4;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "what", "who", "whom", "about", "with", "did", "does", "how", "was",
    "were", "are", "this", "that", "from", "said", "say", "any", "has", "have",
];

/// Optional restrictions on a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Earliest session date, inclusive.
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Latest session date, inclusive.
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    /// Ministry name in any recognised form.
    #[serde(default)]
    pub ministry: Option<String>,
}

impl SearchFilters {
    fn has_dates(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }

    fn admits_date(&self, date: Option<NaiveDate>) -> bool {
        if !self.has_dates() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.date_from.map_or(true, |from| date >= from) && self.date_to.map_or(true, |to| date <= to)
    }
}

/// How a result was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Vector,
    Keyword,
    Entity,
}

/// One answer to a query, with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub statement_id: String,
    pub summary: Option<String>,
    pub snippet: String,
    pub speaker: Option<String>,
    pub ministry: Option<String>,
    pub video_id: String,
    pub video_title: Option<String>,
    pub session_date: Option<NaiveDate>,
    pub start_ts: f64,
    pub video_uri_with_timestamp: String,
    pub score: f32,
    pub matched_by: MatchKind,
}

/// Read-only query access to a graph store.
pub struct QueryEngine {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    resolver: EntityResolver,
    settings: QuerySettings,
}

/// Per-query cache of looked-up nodes.
#[derive(Default)]
struct NodeCache(HashMap<String, Option<Node>>);

impl NodeCache {
    async fn get(&mut self, store: &dyn GraphStore, node_id: &str) -> Result<Option<Node>> {
        if let Some(cached) = self.0.get(node_id) {
            return Ok(cached.clone());
        }
        let node = store.get_node(node_id).await?;
        self.0.insert(node_id.to_string(), node.clone());
        Ok(node)
    }
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        entities: &EntitySettings,
        settings: QuerySettings,
    ) -> Self {
        Self {
            store,
            embedder,
            resolver: EntityResolver::new(&entities.aliases),
            settings,
        }
    }

    fn candidate_limit(&self) -> usize {
        self.settings.top_k.max(1) * OVERFETCH
    }

    /// Search by meaning. Statements lacking an embedding are added from the
    /// keyword path with a score of zero, so they rank after every vector hit.
    #[instrument(skip(self, filters))]
    pub async fn search(&self, query: &str, filters: &SearchFilters) -> Vec<ResultRecord> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        match self.vector_hits(query, filters).await {
            Ok(hits) => results.extend(hits),
            Err(e) => warn!("Vector retrieval failed, falling back to keywords: {}", e),
        }

        match self.keyword_records(query, filters, true).await {
            Ok(fallback) => {
                results.extend(fallback.into_iter().map(|mut r| {
                    r.score = 0.0;
                    r
                }));
            }
            Err(e) => warn!("Keyword fallback failed: {}", e),
        }

        let results = self.finish(results);
        debug!("Query returned {} results", results.len());
        results
    }

    /// Search by keyword over statement text and summaries, embedded or not.
    /// The score is the fraction of query terms the statement contains.
    #[instrument(skip(self, filters))]
    pub async fn keyword_search(&self, query: &str, filters: &SearchFilters) -> Vec<ResultRecord> {
        match self.keyword_records(query, filters, false).await {
            Ok(results) => self.finish(results),
            Err(e) => {
                warn!("Keyword search failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Statements linked to one entity, newest session first.
    #[instrument(skip(self))]
    pub async fn lookup_entity(&self, node_type: NodeType, label: &str) -> Vec<ResultRecord> {
        match self.entity_records(node_type, label).await {
            Ok(results) => {
                let mut results = dedup(rank(results), self.settings.dedup_window_seconds);
                results.truncate(self.settings.top_k);
                results
            }
            Err(e) => {
                warn!("Entity lookup failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Turn search filters into a store filter. `None` means nothing can
    /// match, such as a ministry name that resolves to no ministry.
    async fn statement_filter(&self, filters: &SearchFilters) -> Result<Option<StatementFilter>> {
        let mut filter = StatementFilter::default();

        if let Some(ministry) = &filters.ministry {
            match self.resolver.canonicalize(NodeType::Ministry, ministry) {
                Some(label) => filter.ministry_id = Some(ids::entity_node_id(NodeType::Ministry, &label)),
                None => return Ok(None),
            }
        }

        if filters.has_dates() {
            let videos: BTreeSet<String> = self
                .store
                .list_nodes(Some(NodeType::Video))
                .await?
                .into_iter()
                .filter(|v| filters.admits_date(session_date_of(v)))
                .map(|v| v.node_id)
                .collect();
            filter.video_ids = Some(videos);
        }

        Ok(Some(filter))
    }

    async fn vector_hits(&self, query: &str, filters: &SearchFilters) -> Result<Vec<ResultRecord>> {
        let Some(filter) = self.statement_filter(filters).await? else {
            return Ok(Vec::new());
        };

        let vector = self.embedder.embed(query).await?;
        if let Some(dimension) = self.store.embedding_dimension().await? {
            if dimension != vector.len() {
                warn!(
                    "Query embedding has {} dimensions but the store holds {}; run reembed",
                    vector.len(),
                    dimension
                );
            }
        }

        let hits = self
            .store
            .nearest_statements(&vector, &filter, self.candidate_limit(), self.settings.min_score)
            .await?;

        let mut cache = NodeCache::default();
        let mut results = Vec::new();
        for hit in hits {
            results.push(
                self.expand(&hit.statement, hit.score, MatchKind::Vector, &mut cache)
                    .await?,
            );
        }
        Ok(results)
    }

    async fn keyword_records(
        &self,
        query: &str,
        filters: &SearchFilters,
        unembedded_only: bool,
    ) -> Result<Vec<ResultRecord>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let Some(mut filter) = self.statement_filter(filters).await? else {
            return Ok(Vec::new());
        };
        filter.unembedded_only = unembedded_only;

        let candidates = self
            .store
            .keyword_candidates(&terms, &filter, self.candidate_limit())
            .await?;

        let mut cache = NodeCache::default();
        let mut results = Vec::new();
        for statement in candidates {
            let score = term_coverage(&terms, &statement);
            results.push(
                self.expand(&statement, score, MatchKind::Keyword, &mut cache)
                    .await?,
            );
        }
        Ok(results)
    }

    async fn entity_records(&self, node_type: NodeType, label: &str) -> Result<Vec<ResultRecord>> {
        let Some(canonical) = self.resolver.canonicalize(node_type, label) else {
            return Ok(Vec::new());
        };
        let node_id = ids::entity_node_id(node_type, &canonical);

        let mut cache = NodeCache::default();
        let mut results = Vec::new();
        for edge in self.store.edges_to(&node_id).await? {
            if edge.label == labels::FOLLOWS || edge.label == labels::FROM_VIDEO {
                continue;
            }
            let Some(statement) = self.store.get_statement(&edge.source_node_id).await? else {
                continue;
            };
            results.push(
                self.expand(&statement, 1.0, MatchKind::Entity, &mut cache)
                    .await?,
            );
        }
        Ok(results)
    }

    /// One-hop expansion to the statement's video, speaker and ministry.
    async fn expand(
        &self,
        statement: &Statement,
        score: f32,
        matched_by: MatchKind,
        cache: &mut NodeCache,
    ) -> Result<ResultRecord> {
        let store = self.store.as_ref();
        let video = cache.get(store, &statement.video_id).await?;
        let session_date = video.as_ref().and_then(session_date_of);

        let speaker = match &statement.speaker_id {
            Some(id) => cache.get(store, id).await?.map(|n| n.display_name().to_string()),
            None => None,
        };
        let ministry = match &statement.ministry_id {
            Some(id) => cache.get(store, id).await?.map(|n| n.display_name().to_string()),
            None => None,
        };

        let source_uri = video
            .as_ref()
            .and_then(|v| v.properties.get("source_uri"))
            .unwrap_or("");

        Ok(ResultRecord {
            statement_id: statement.statement_id.clone(),
            summary: statement.summary_text.clone(),
            snippet: snippet(&statement.raw_text),
            speaker,
            ministry,
            video_id: statement.video_id.clone(),
            video_title: video
                .as_ref()
                .and_then(|v| v.properties.get("title"))
                .map(str::to_string),
            session_date,
            start_ts: statement.start_ts,
            video_uri_with_timestamp: uri_with_timestamp(
                &statement.video_id,
                source_uri,
                statement.start_ts,
            ),
            score,
            matched_by,
        })
    }

    fn finish(&self, results: Vec<ResultRecord>) -> Vec<ResultRecord> {
        let mut results = dedup(rank(results), self.settings.dedup_window_seconds);
        results.truncate(self.settings.top_k);
        results
    }
}

/// Score descending, then newer session, then statement id.
fn rank(mut results: Vec<ResultRecord>) -> Vec<ResultRecord> {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.session_date.cmp(&a.session_date))
            .then_with(|| a.statement_id.cmp(&b.statement_id))
    });
    results
}

/// Drop results that repeat a statement or land within `window` seconds of a
/// better-ranked result from the same video. Expects ranked input.
fn dedup(results: Vec<ResultRecord>, window: f64) -> Vec<ResultRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<ResultRecord> = Vec::with_capacity(results.len());
    for record in results {
        if !seen.insert(record.statement_id.clone()) {
            continue;
        }
        let near = kept.iter().any(|k| {
            k.video_id == record.video_id && (k.start_ts - record.start_ts).abs() <= window
        });
        if !near {
            kept.push(record);
        }
    }
    kept
}

/// Lowercased query words worth matching on.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-'))
    {
        if word.chars().count() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        if !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms
}

fn session_date_of(video: &Node) -> Option<NaiveDate> {
    video
        .properties
        .get("session_date")
        .and_then(|d| d.parse::<NaiveDate>().ok())
}

fn snippet(text: &str) -> String {
    const MAX_CHARS: usize = 280;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_CHARS).collect();
    match cut.rfind(' ') {
        Some(i) => format!("{}...", &cut[..i]),
        None => format!("{}...", cut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, SegmentRange};
    use crate::store::MemoryGraphStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
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

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(crate::error::ParlError::ProviderUnavailable("quota".into()))
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    fn statement(video_id: &str, first: usize, start: f64, text: &str, embedding: Option<Vec<f32>>) -> Statement {
        Statement {
            statement_id: ids::statement_id(video_id, first, first),
            video_id: video_id.into(),
            segment_range: SegmentRange { first, last: first },
            start_ts: start,
            end_ts: start + 5.0,
            speaker_id: None,
            ministry_id: None,
            summary_text: None,
            embedding_vector: embedding,
            raw_text: text.into(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    async fn seeded() -> Arc<dyn GraphStore> {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        for (video_id, date) in [("v1", "2024-01-10"), ("v2", "2024-02-20")] {
            let mut node = Node::new(video_id.into(), NodeType::Video, video_id.into(), format!("u/{}", video_id));
            node.properties.insert("session_date", date, Some(video_id));
            store.upsert_node(&node).await.unwrap();
        }
        let embedder = AxisEmbedder;
        for s in [
            statement("v1", 0, 12.0, "the vaccination rollout", None),
            statement("v2", 0, 40.0, "hospital bed capacity", None),
            statement("v2", 1, 90.0, "more hospital beds and vaccination camps", None),
        ] {
            let mut s = s;
            s.embedding_vector = Some(embedder.embed(&s.raw_text).await.unwrap());
            store.upsert_statement(&s).await.unwrap();
        }
        store
    }

    fn engine(store: Arc<dyn GraphStore>, embedder: Arc<dyn Embedder>) -> QueryEngine {
        QueryEngine::new(store, embedder, &EntitySettings::default(), QuerySettings::default())
    }

    #[tokio::test]
    async fn test_closest_statement_ranks_first() {
        let engine = engine(seeded().await, Arc::new(AxisEmbedder));
        let results = engine.search("vaccination", &SearchFilters::default()).await;

        assert_eq!(results[0].video_id, "v1");
        assert_eq!(results[0].matched_by, MatchKind::Vector);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(
            results[0].video_uri_with_timestamp,
            "https://www.youtube.com/watch?v=v1&t=12s"
        );
    }

    #[tokio::test]
    async fn test_date_filter() {
        let engine = engine(seeded().await, Arc::new(AxisEmbedder));
        let filters = SearchFilters {
            date_from: NaiveDate::from_ymd_opt(2024, 2, 1),
            ..Default::default()
        };
        let results = engine.search("vaccination", &filters).await;
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.video_id == "v2"));
    }

    #[tokio::test]
    async fn test_failed_embedding_falls_back_to_keywords() {
        let store = seeded().await;
        store
            .upsert_statement(&statement("v1", 5, 300.0, "vaccination supply shortfall", None))
            .await
            .unwrap();

        let engine = engine(store, Arc::new(DownEmbedder));
        let results = engine.search("vaccination", &SearchFilters::default()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_by, MatchKind::Keyword);
        assert_eq!(results[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_empty_query_is_empty_result() {
        let engine = engine(seeded().await, Arc::new(AxisEmbedder));
        assert!(engine.search("   ", &SearchFilters::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_entity_by_alias() {
        let store = seeded().await;
        let ministry_id = ids::entity_node_id(NodeType::Ministry, "ministry of health");
        store
            .upsert_node(&Node::new(
                ministry_id.clone(),
                NodeType::Ministry,
                "ministry of health".into(),
                "u/m".into(),
            ))
            .await
            .unwrap();
        let mut s = statement("v2", 0, 40.0, "hospital bed capacity", None);
        s.ministry_id = Some(ministry_id.clone());
        store.upsert_statement(&s).await.unwrap();
        store
            .upsert_node(&Node::new(
                s.statement_id.clone(),
                NodeType::Statement,
                s.statement_id.clone(),
                "u/s".into(),
            ))
            .await
            .unwrap();
        store
            .upsert_edge(&Edge::new(&s.statement_id, labels::CONCERNS_MINISTRY, &ministry_id))
            .await
            .unwrap();

        let engine = engine(store, Arc::new(AxisEmbedder));
        let results = engine.lookup_entity(NodeType::Ministry, "Health Ministry").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].statement_id, s.statement_id);
        assert_eq!(results[0].ministry.as_deref(), Some("ministry of health"));
    }

    #[tokio::test]
    async fn test_ministry_filter_applies_before_the_candidate_cut() {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let health = ids::entity_node_id(NodeType::Ministry, "ministry of health");
        let finance = ids::entity_node_id(NodeType::Ministry, "ministry of finance");
        for i in 0..50 {
            let mut s = statement("h", i, i as f64 * 30.0, "vaccination drive", Some(vec![1.0, 0.0, 0.1]));
            s.ministry_id = Some(health.clone());
            store.upsert_statement(&s).await.unwrap();
        }
        let mut s = statement("f", 0, 10.0, "vaccination budget", Some(vec![0.6, 0.8, 0.0]));
        s.ministry_id = Some(finance.clone());
        store.upsert_statement(&s).await.unwrap();

        let engine = engine(store, Arc::new(AxisEmbedder));
        let filters = SearchFilters {
            ministry: Some("Ministry of Finance".into()),
            ..Default::default()
        };
        let results = engine.search("vaccination", &filters).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].statement_id, s.statement_id);

        let unknown = SearchFilters {
            ministry: Some("   ".into()),
            ..Default::default()
        };
        assert!(engine.search("vaccination", &unknown).await.is_empty());
    }

    #[tokio::test]
    async fn test_unembedded_statement_outlasts_many_keyword_matches() {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        for i in 0..45 {
            store
                .upsert_statement(&statement("a", i, i as f64 * 30.0, "vaccination update", Some(vec![0.0, 1.0, 0.1])))
                .await
                .unwrap();
        }
        let degraded = statement("z", 0, 5.0, "vaccination shortfall", None);
        store.upsert_statement(&degraded).await.unwrap();

        let settings = QuerySettings {
            min_score: 0.5,
            ..Default::default()
        };
        let engine = QueryEngine::new(store, Arc::new(AxisEmbedder), &EntitySettings::default(), settings);

        let found = engine.search("vaccination shortfall", &SearchFilters::default()).await;
        assert!(found.iter().any(|r| r.statement_id == degraded.statement_id));

        let found = engine
            .keyword_search("vaccination shortfall", &SearchFilters::default())
            .await;
        assert_eq!(found[0].statement_id, degraded.statement_id);
        assert_eq!(found[0].score, 1.0);
    }

    #[test]
    fn test_dedup_keeps_best_of_near_duplicates() {
        let record = |id: &str, start: f64, score: f32| ResultRecord {
            statement_id: id.into(),
            summary: None,
            snippet: String::new(),
            speaker: None,
            ministry: None,
            video_id: "v".into(),
            video_title: None,
            session_date: None,
            start_ts: start,
            video_uri_with_timestamp: String::new(),
            score,
            matched_by: MatchKind::Vector,
        };
        let kept = dedup(
            rank(vec![record("a", 10.0, 0.5), record("b", 12.0, 0.9), record("c", 60.0, 0.1)]),
            5.0,
        );
        let ids: Vec<&str> = kept.iter().map(|r| r.statement_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("What did the Minister say about COVID-19 vaccination?"),
            vec!["minister", "covid-19", "vaccination"]
        );
    }
}
