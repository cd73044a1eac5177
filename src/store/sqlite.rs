//! SQLite-based graph store implementation.
//!
//! Cosine similarity is computed in Rust over the stored embeddings.

use super::merge::{merge, Merged, Versioned};
use super::{
    cosine_similarity, rank_keyword_matches, GraphStore, HistoryEntry, StatementFilter,
    StatementHit, StoreStats, UpsertOutcome,
};
use crate::error::{ParlError, Result};
use crate::graph::{Edge, Node, NodeType, PropertyMap, SegmentRange, Statement};
use crate::ingest::RawVideo;
use crate::segment::Video;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_videos (
    video_id TEXT PRIMARY KEY,
    record_json TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS videos (
    video_id TEXT PRIMARY KEY,
    record_json TEXT NOT NULL,
    segmented_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    node_id TEXT PRIMARY KEY,
    node_type TEXT NOT NULL,
    canonical_label TEXT NOT NULL,
    uri TEXT NOT NULL,
    properties_json TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (node_type, canonical_label)
);

CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(canonical_label);

CREATE TABLE IF NOT EXISTS edges (
    edge_id TEXT PRIMARY KEY,
    source_node_id TEXT NOT NULL REFERENCES nodes(node_id),
    target_node_id TEXT NOT NULL REFERENCES nodes(node_id),
    label TEXT NOT NULL,
    properties_json TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_node_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_node_id);

CREATE TABLE IF NOT EXISTS statements (
    statement_id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL,
    first_segment INTEGER NOT NULL,
    last_segment INTEGER NOT NULL,
    start_ts REAL NOT NULL,
    end_ts REAL NOT NULL,
    speaker_id TEXT,
    ministry_id TEXT,
    summary_text TEXT,
    embedding BLOB,
    raw_text TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_statements_video_id ON statements(video_id);

CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_kind TEXT NOT NULL,
    record_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    snapshot TEXT NOT NULL,
    superseded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_record ON history(record_id);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const DIMENSION_KEY: &str = "embedding_dimension";

const NODE_COLUMNS: &str = "node_id, node_type, canonical_label, uri, properties_json, version, updated_at";
const EDGE_COLUMNS: &str =
    "edge_id, source_node_id, target_node_id, label, properties_json, version, updated_at";
const STATEMENT_COLUMNS: &str = "statement_id, video_id, first_segment, last_segment, start_ts, end_ts, \
     speaker_id, ministry_id, summary_text, embedding, raw_text, version, updated_at";

/// SQLite-based graph store.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite graph store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ParlError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

fn conversion_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn properties(row: &Row, idx: usize) -> rusqlite::Result<PropertyMap> {
    let json: String = row.get(idx)?;
    serde_json::from_str(&json).map_err(|e| conversion_error(idx, e))
}

fn node_from_row(row: &Row) -> rusqlite::Result<Node> {
    let node_type: String = row.get(1)?;
    let updated_at: String = row.get(6)?;
    Ok(Node {
        node_id: row.get(0)?,
        node_type: node_type
            .parse::<NodeType>()
            .map_err(|e| conversion_error(1, e))?,
        canonical_label: row.get(2)?,
        uri: row.get(3)?,
        properties: properties(row, 4)?,
        version: row.get(5)?,
        updated_at: parse_time(&updated_at),
    })
}

fn edge_from_row(row: &Row) -> rusqlite::Result<Edge> {
    let updated_at: String = row.get(6)?;
    Ok(Edge {
        edge_id: row.get(0)?,
        source_node_id: row.get(1)?,
        target_node_id: row.get(2)?,
        label: row.get(3)?,
        properties: properties(row, 4)?,
        version: row.get(5)?,
        updated_at: parse_time(&updated_at),
    })
}

fn statement_from_row(row: &Row) -> rusqlite::Result<Statement> {
    let first: i64 = row.get(2)?;
    let last: i64 = row.get(3)?;
    let embedding: Option<Vec<u8>> = row.get(9)?;
    let updated_at: String = row.get(12)?;
    Ok(Statement {
        statement_id: row.get(0)?,
        video_id: row.get(1)?,
        segment_range: SegmentRange {
            first: first as usize,
            last: last as usize,
        },
        start_ts: row.get(4)?,
        end_ts: row.get(5)?,
        speaker_id: row.get(6)?,
        ministry_id: row.get(7)?,
        summary_text: row.get(8)?,
        embedding_vector: embedding.map(|b| SqliteGraphStore::bytes_to_embedding(&b)),
        raw_text: row.get(10)?,
        version: row.get(11)?,
        updated_at: parse_time(&updated_at),
    })
}

fn load_node(conn: &Connection, node_id: &str) -> Result<Option<Node>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM nodes WHERE node_id = ?1", NODE_COLUMNS),
            params![node_id],
            node_from_row,
        )
        .optional()?)
}

fn load_edge(conn: &Connection, edge_id: &str) -> Result<Option<Edge>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM edges WHERE edge_id = ?1", EDGE_COLUMNS),
            params![edge_id],
            edge_from_row,
        )
        .optional()?)
}

fn load_statement(conn: &Connection, statement_id: &str) -> Result<Option<Statement>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM statements WHERE statement_id = ?1", STATEMENT_COLUMNS),
            params![statement_id],
            statement_from_row,
        )
        .optional()?)
}

fn write_node(conn: &Connection, node: &Node) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO nodes
        (node_id, node_type, canonical_label, uri, properties_json, version, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            node.node_id,
            node.node_type.as_str(),
            node.canonical_label,
            node.uri,
            serde_json::to_string(&node.properties)?,
            node.version,
            node.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn write_edge(conn: &Connection, edge: &Edge) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO edges
        (edge_id, source_node_id, target_node_id, label, properties_json, version, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            edge.edge_id,
            edge.source_node_id,
            edge.target_node_id,
            edge.label,
            serde_json::to_string(&edge.properties)?,
            edge.version,
            edge.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn write_statement(conn: &Connection, statement: &Statement) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO statements
        (statement_id, video_id, first_segment, last_segment, start_ts, end_ts,
         speaker_id, ministry_id, summary_text, embedding, raw_text, version, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
        params![
            statement.statement_id,
            statement.video_id,
            statement.segment_range.first as i64,
            statement.segment_range.last as i64,
            statement.start_ts,
            statement.end_ts,
            statement.speaker_id,
            statement.ministry_id,
            statement.summary_text,
            statement
                .embedding_vector
                .as_deref()
                .map(SqliteGraphStore::embedding_to_bytes),
            statement.raw_text,
            statement.version,
            statement.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn archive<T: Versioned>(conn: &Connection, previous: &T) -> Result<()> {
    archive_raw(
        conn,
        T::KIND,
        previous.record_id(),
        previous.version(),
        &serde_json::to_string(previous)?,
    )
}

fn archive_raw(conn: &Connection, kind: &str, id: &str, version: u32, snapshot: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO history (record_kind, record_id, version, snapshot, superseded_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![kind, id, version, snapshot, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn read_dimension(conn: &Connection) -> Result<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![DIMENSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|v| {
            v.parse::<usize>()
                .map_err(|e| ParlError::Store(format!("corrupt embedding dimension '{}': {}", v, e)))
        })
        .transpose()
}

fn write_dimension(conn: &Connection, dimension: usize) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![DIMENSION_KEY, dimension.to_string()],
    )?;
    Ok(())
}

/// Apply a merge decision inside a transaction.
fn apply<T: Versioned>(
    conn: &Connection,
    merged: Merged<T>,
    write: fn(&Connection, &T) -> Result<()>,
) -> Result<UpsertOutcome> {
    let outcome = merged.outcome();
    match merged {
        Merged::Insert(next) => write(conn, &next)?,
        Merged::Update { previous, next } => {
            archive(conn, &previous)?;
            write(conn, &next)?;
        }
        Merged::Unchanged => {}
    }
    Ok(outcome)
}

/// Statements admitted by `filter` that also satisfy `condition`.
fn filtered_statements(conn: &Connection, filter: &StatementFilter, condition: &str) -> Result<Vec<Statement>> {
    let mut clauses = vec![condition.to_string()];
    if filter.unembedded_only {
        clauses.push("embedding IS NULL".to_string());
    }
    let mut args: Vec<&dyn rusqlite::ToSql> = Vec::new();
    if let Some(ministry_id) = &filter.ministry_id {
        args.push(ministry_id);
        clauses.push(format!("ministry_id = ?{}", args.len()));
    }
    let sql = format!(
        "SELECT {} FROM statements WHERE {} ORDER BY video_id, start_ts, statement_id",
        STATEMENT_COLUMNS,
        clauses.join(" AND ")
    );

    let mut statements = query_statements(conn, &sql, &args)?;
    statements.retain(|s| filter.admits(s));
    Ok(statements)
}

fn query_statements(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Statement>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, statement_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn query_nodes(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Node>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, node_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn query_edges(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, edge_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    #[instrument(skip(self, raw), fields(video_id = %raw.video_id))]
    async fn put_raw_video(&self, raw: &RawVideo) -> Result<bool> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT record_json FROM raw_videos WHERE video_id = ?1",
                params![raw.video_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(json) = &existing {
            let stored: RawVideo = serde_json::from_str(json)?;
            if stored == *raw {
                return Ok(false);
            }
            let version: u32 = tx.query_row(
                "SELECT COUNT(*) + 1 FROM history WHERE record_id = ?1",
                params![raw.video_id],
                |row| row.get(0),
            )?;
            archive_raw(&tx, "raw_video", &raw.video_id, version, json)?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO raw_videos (video_id, record_json, ingested_at) VALUES (?1, ?2, ?3)",
            params![raw.video_id, serde_json::to_string(raw)?, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        debug!("Stored raw video {}", raw.video_id);
        Ok(true)
    }

    async fn get_raw_video(&self, video_id: &str) -> Result<Option<RawVideo>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM raw_videos WHERE video_id = ?1",
                params![video_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(ParlError::from))
            .transpose()
    }

    async fn list_raw_video_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT video_id FROM raw_videos ORDER BY video_id")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        Ok(ids.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    async fn put_video(&self, video: &Video) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO videos (video_id, record_json, segmented_at) VALUES (?1, ?2, ?3)",
            params![video.video_id, serde_json::to_string(video)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM videos WHERE video_id = ?1",
                params![video_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(ParlError::from))
            .transpose()
    }

    async fn list_videos(&self) -> Result<Vec<Video>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT record_json FROM videos ORDER BY video_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut videos = Vec::new();
        for json in rows {
            videos.push(serde_json::from_str(&json?)?);
        }
        Ok(videos)
    }

    #[instrument(skip(self, node), fields(node_id = %node.node_id))]
    async fn upsert_node(&self, node: &Node) -> Result<UpsertOutcome> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let merged = merge(load_node(&tx, &node.node_id)?, node);
        let outcome = apply(&tx, merged, write_node)?;
        tx.commit()?;
        Ok(outcome)
    }

    #[instrument(skip(self, edge), fields(edge_id = %edge.edge_id))]
    async fn upsert_edge(&self, edge: &Edge) -> Result<UpsertOutcome> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM nodes WHERE node_id = ?1)",
                params![endpoint],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(ParlError::DanglingReference {
                    edge_id: edge.edge_id.clone(),
                    missing_node_id: endpoint.clone(),
                });
            }
        }

        let merged = merge(load_edge(&tx, &edge.edge_id)?, edge);
        let outcome = apply(&tx, merged, write_edge)?;
        tx.commit()?;
        Ok(outcome)
    }

    #[instrument(skip(self, statement), fields(statement_id = %statement.statement_id))]
    async fn upsert_statement(&self, statement: &Statement) -> Result<UpsertOutcome> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        if let Some(vector) = &statement.embedding_vector {
            match read_dimension(&tx)? {
                Some(expected) if expected != vector.len() => {
                    return Err(ParlError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
                Some(_) => {}
                None => write_dimension(&tx, vector.len())?,
            }
        }

        let merged = merge(load_statement(&tx, &statement.statement_id)?, statement);
        let outcome = apply(&tx, merged, write_statement)?;
        tx.commit()?;
        Ok(outcome)
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>> {
        let conn = self.lock()?;
        load_node(&conn, node_id)
    }

    async fn find_nodes_by_label(&self, canonical_label: &str) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        query_nodes(
            &conn,
            &format!(
                "SELECT {} FROM nodes WHERE canonical_label = ?1 ORDER BY node_id",
                NODE_COLUMNS
            ),
            &[&canonical_label],
        )
    }

    async fn list_nodes(&self, node_type: Option<NodeType>) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        match node_type {
            Some(t) => query_nodes(
                &conn,
                &format!("SELECT {} FROM nodes WHERE node_type = ?1 ORDER BY node_id", NODE_COLUMNS),
                &[&t.as_str()],
            ),
            None => query_nodes(
                &conn,
                &format!("SELECT {} FROM nodes ORDER BY node_id", NODE_COLUMNS),
                &[],
            ),
        }
    }

    async fn list_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.lock()?;
        query_edges(
            &conn,
            &format!("SELECT {} FROM edges ORDER BY edge_id", EDGE_COLUMNS),
            &[],
        )
    }

    async fn edges_from(&self, node_id: &str) -> Result<Vec<Edge>> {
        let conn = self.lock()?;
        query_edges(
            &conn,
            &format!(
                "SELECT {} FROM edges WHERE source_node_id = ?1 ORDER BY edge_id",
                EDGE_COLUMNS
            ),
            &[&node_id],
        )
    }

    async fn edges_to(&self, node_id: &str) -> Result<Vec<Edge>> {
        let conn = self.lock()?;
        query_edges(
            &conn,
            &format!(
                "SELECT {} FROM edges WHERE target_node_id = ?1 ORDER BY edge_id",
                EDGE_COLUMNS
            ),
            &[&node_id],
        )
    }

    async fn get_statement(&self, statement_id: &str) -> Result<Option<Statement>> {
        let conn = self.lock()?;
        load_statement(&conn, statement_id)
    }

    async fn list_statements(&self, video_id: Option<&str>) -> Result<Vec<Statement>> {
        let conn = self.lock()?;
        match video_id {
            Some(v) => query_statements(
                &conn,
                &format!(
                    "SELECT {} FROM statements WHERE video_id = ?1 ORDER BY start_ts, statement_id",
                    STATEMENT_COLUMNS
                ),
                &[&v],
            ),
            None => query_statements(
                &conn,
                &format!(
                    "SELECT {} FROM statements ORDER BY video_id, start_ts, statement_id",
                    STATEMENT_COLUMNS
                ),
                &[],
            ),
        }
    }

    async fn history(&self, record_id: &str) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT record_kind, record_id, version, snapshot, superseded_at
            FROM history
            WHERE record_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![record_id], |row| {
            let superseded_at: String = row.get(4)?;
            Ok(HistoryEntry {
                record_kind: row.get(0)?,
                record_id: row.get(1)?,
                version: row.get(2)?,
                snapshot: row.get(3)?,
                superseded_at: parse_time(&superseded_at),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[instrument(skip(self, query))]
    async fn nearest_statements(
        &self,
        query: &[f32],
        filter: &StatementFilter,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<StatementHit>> {
        let conn = self.lock()?;
        let statements = filtered_statements(&conn, filter, "embedding IS NOT NULL")?;

        let mut results: Vec<StatementHit> = statements
            .into_iter()
            .filter_map(|statement| {
                let score = cosine_similarity(query, statement.embedding_vector.as_deref()?);
                Some(StatementHit { statement, score })
            })
            .filter(|r| r.score >= min_score)
            .collect();

        // Sort by score descending
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        debug!("Found {} matching statements", results.len());
        Ok(results)
    }

    async fn keyword_candidates(
        &self,
        terms: &[String],
        filter: &StatementFilter,
        limit: usize,
    ) -> Result<Vec<Statement>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite's lower() folds ASCII only, so terms are matched in Rust.
        let conn = self.lock()?;
        let statements = filtered_statements(&conn, filter, "1 = 1")?;
        Ok(rank_keyword_matches(statements, terms, limit))
    }

    async fn embedding_dimension(&self) -> Result<Option<usize>> {
        let conn = self.lock()?;
        read_dimension(&conn)
    }

    #[instrument(skip(self))]
    async fn reset_embeddings(&self, dimension: usize) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let cleared = tx.execute("UPDATE statements SET embedding = NULL", [])?;
        write_dimension(&tx, dimension)?;
        tx.commit()?;
        info!("Cleared {} embeddings; store dimension is now {}", cleared, dimension);
        Ok(())
    }

    async fn set_statement_embedding(&self, statement_id: &str, embedding: Option<&[f32]>) -> Result<()> {
        let conn = self.lock()?;
        if let (Some(vector), Some(expected)) = (embedding, read_dimension(&conn)?) {
            if vector.len() != expected {
                return Err(ParlError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let updated = conn.execute(
            "UPDATE statements SET embedding = ?1, updated_at = ?2 WHERE statement_id = ?3",
            params![
                embedding.map(SqliteGraphStore::embedding_to_bytes),
                Utc::now().to_rfc3339(),
                statement_id
            ],
        )?;
        if updated == 0 {
            return Err(ParlError::NotFound(format!("statement {}", statement_id)));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let mut nodes_by_type = BTreeMap::new();
        {
            let mut stmt = conn.prepare("SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (node_type, n) = row?;
                nodes_by_type.insert(node_type, n as usize);
            }
        }

        Ok(StoreStats {
            raw_videos: count("SELECT COUNT(*) FROM raw_videos")?,
            videos: count("SELECT COUNT(*) FROM videos")?,
            nodes_by_type,
            edges: count("SELECT COUNT(*) FROM edges")?,
            statements: count("SELECT COUNT(*) FROM statements")?,
            statements_without_embedding: count(
                "SELECT COUNT(*) FROM statements WHERE embedding IS NULL",
            )?,
            embedding_dimension: read_dimension(&conn)?,
            history_entries: count("SELECT COUNT(*) FROM history")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::labels;

    fn node(id: &str, node_type: NodeType, label: &str) -> Node {
        Node::new(id.into(), node_type, label.into(), format!("https://x/{}", id))
    }

    fn statement(id: &str, embedding: Option<Vec<f32>>) -> Statement {
        Statement {
            statement_id: id.into(),
            video_id: "v1".into(),
            segment_range: SegmentRange { first: 0, last: 1 },
            start_ts: 1.5,
            end_ts: 9.0,
            speaker_id: Some("sp".into()),
            ministry_id: None,
            summary_text: Some("Beds were added".into()),
            embedding_vector: embedding,
            raw_text: "We added 500 hospital beds".into(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_node_roundtrip_and_versioning() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let mut n = node("m1", NodeType::Ministry, "ministry of health");
        n.properties.insert("seen_in.v1", "2024-01-10", Some("v1"));

        assert_eq!(store.upsert_node(&n).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_node(&n).await.unwrap(), UpsertOutcome::Unchanged);

        let mut later = n.clone();
        later.properties.insert("seen_in.v2", "2024-02-20", Some("v2"));
        assert_eq!(store.upsert_node(&later).await.unwrap(), UpsertOutcome::Updated);

        let stored = store.get_node("m1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.properties.get("seen_in.v1"), Some("2024-01-10"));
        assert_eq!(stored.properties.source_of("seen_in.v2"), Some("v2"));
        assert_eq!(store.history("m1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edge_requires_endpoints() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.upsert_node(&node("a", NodeType::Statement, "a")).await.unwrap();

        let edge = Edge::new("a", labels::SPOKEN_BY, "b");
        match store.upsert_edge(&edge).await {
            Err(ParlError::DanglingReference { missing_node_id, .. }) => {
                assert_eq!(missing_node_id, "b")
            }
            other => panic!("expected dangling reference, got {:?}", other),
        }
        assert!(store.list_edges().await.unwrap().is_empty());

        store.upsert_node(&node("b", NodeType::Speaker, "dr. x")).await.unwrap();
        assert_eq!(store.upsert_edge(&edge).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.edges_to("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_statement_embedding_and_dimension() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .upsert_statement(&statement("s1", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store.upsert_statement(&statement("s2", None)).await.unwrap();

        let stored = store.get_statement("s1").await.unwrap().unwrap();
        assert_eq!(stored.embedding_vector, Some(vec![1.0, 0.0]));
        assert_eq!(stored.segment_range, SegmentRange { first: 0, last: 1 });
        assert_eq!(store.embedding_dimension().await.unwrap(), Some(2));

        let err = store
            .upsert_statement(&statement("s3", Some(vec![1.0, 0.0, 0.0])))
            .await
            .unwrap_err();
        assert!(matches!(err, ParlError::DimensionMismatch { expected: 2, actual: 3 }));

        let hits = store
            .nearest_statements(&[1.0, 0.0], &StatementFilter::default(), 10, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].statement.statement_id, "s1");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.statements, 2);
        assert_eq!(stats.statements_without_embedding, 1);
    }

    #[tokio::test]
    async fn test_keyword_candidates() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.upsert_statement(&statement("s1", None)).await.unwrap();
        let any = StatementFilter::default();

        let found = store
            .keyword_candidates(&["Hospital".to_string()], &any, 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let none = store
            .keyword_candidates(&["100%".to_string()], &any, 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_candidates_fold_unicode_case() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let mut s = statement("s1", None);
        s.raw_text = "ÉTAT DE SANTÉ publique".to_string();
        store.upsert_statement(&s).await.unwrap();

        let found = store
            .keyword_candidates(&["santé".to_string()], &StatementFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_candidates_rank_before_limit() {
        let store = SqliteGraphStore::in_memory().unwrap();
        for i in 0..5 {
            let mut s = statement(&format!("a{}", i), Some(vec![1.0, 0.0]));
            s.video_id = "a".to_string();
            s.raw_text = "vaccination update".to_string();
            store.upsert_statement(&s).await.unwrap();
        }
        let mut degraded = statement("z0", None);
        degraded.video_id = "z".to_string();
        degraded.raw_text = "vaccination shortfall".to_string();
        store.upsert_statement(&degraded).await.unwrap();

        let terms = vec!["vaccination".to_string(), "shortfall".to_string()];
        let best = store
            .keyword_candidates(&terms, &StatementFilter::default(), 2)
            .await
            .unwrap();
        assert_eq!(best[0].statement_id, "z0");

        let unembedded = StatementFilter {
            unembedded_only: true,
            ..Default::default()
        };
        let only = store
            .keyword_candidates(&["vaccination".to_string()], &unembedded, 2)
            .await
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].statement_id, "z0");
    }

    #[tokio::test]
    async fn test_reset_embeddings() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .upsert_statement(&statement("s1", Some(vec![1.0, 0.0])))
            .await
            .unwrap();

        store.reset_embeddings(3).await.unwrap();
        assert!(store.get_statement("s1").await.unwrap().unwrap().embedding_vector.is_none());
        store
            .set_statement_embedding("s1", Some(&[0.0, 1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(store.embedding_dimension().await.unwrap(), Some(3));
    }
}
