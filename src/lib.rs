//! parlgraph - legislative transcripts as a knowledge graph
//!
//! Turns session video transcripts into a versioned graph of statements,
//! speakers, ministries, topics and bills, and answers free-text questions
//! against it by vector similarity.
//!
//! # Architecture
//!
//! The build runs as a batch, each stage consuming the previous one's
//! persisted output:
//!
//! - `ingest` - raw transcripts from a video platform provider
//! - `segment` - time-aligned speaker turns
//! - `extract` - statements, entity references, summaries and embeddings
//! - `graph` - canonical nodes and edges, Turtle and JSON-LD views
//! - `store` - idempotent, versioned persistence
//! - `query` - semantic, keyword and entity retrieval
//! - `pipeline` - coordination of the stages above
//!
//! # Example
//!
//! ```rust,no_run
//! use parlgraph::config::Settings;
//! use parlgraph::ingest::JsonFileProvider;
//! use parlgraph::pipeline::Pipeline;
//! use parlgraph::query::SearchFilters;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(Settings::load()?)?;
//!
//!     let provider = JsonFileProvider::new("transcripts/");
//!     pipeline.ingest(&provider, &[], false).await?;
//!     pipeline.build(&[], false).await?;
//!
//!     let results = pipeline
//!         .query_engine()
//!         .search("COVID vaccination", &SearchFilters::default())
//!         .await;
//!     for r in results {
//!         println!("{:.2} {} {}", r.score, r.video_uri_with_timestamp, r.snippet);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod graph;
pub mod ingest;
pub mod openai;
pub mod pipeline;
pub mod query;
pub mod segment;
pub mod store;

pub use error::{ParlError, Result};
