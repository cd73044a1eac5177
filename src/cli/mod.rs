//! CLI module for parlgraph.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{format_timestamp, Output};

use clap::{Parser, Subcommand};

/// parlgraph - legislative transcripts as a knowledge graph
///
/// Ingests session transcripts, builds a versioned graph of statements,
/// speakers, ministries, topics and bills, and answers questions against it.
#[derive(Parser, Debug)]
#[command(name = "parlgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest raw transcripts from a JSON file or directory
    Ingest {
        /// JSON transcript file or directory of per-video files
        source: String,

        /// Only ingest these videos (ids or YouTube URLs); default is everything in the source
        ids: Vec<String>,

        /// Replace videos that were already ingested
        #[arg(short, long)]
        force: bool,
    },

    /// Segment, extract and load ingested videos into the graph
    Build {
        /// Only build these videos; default is every ingested video
        ids: Vec<String>,

        /// Rebuild videos that are already in the graph
        #[arg(short, long)]
        force: bool,
    },

    /// Search statements by meaning
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Earliest session date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Latest session date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Only statements concerning this ministry
        #[arg(short, long)]
        ministry: Option<String>,

        /// Match on words instead of embeddings (no API calls)
        #[arg(short, long)]
        keyword: bool,
    },

    /// List statements linked to an entity
    Lookup {
        /// Entity type (speaker, ministry, topic, bill)
        entity_type: String,

        /// Entity name in any recognised form
        label: String,
    },

    /// Export a video's graph as Turtle or JSON-LD
    Export {
        /// Video ID to export
        video_id: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format (ttl, jsonld)
        #[arg(long, default_value = "ttl")]
        format: String,
    },

    /// List videos in the graph
    List,

    /// Show store statistics
    Stats,

    /// Re-embed every statement with the configured embedding model
    Reembed {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Start HTTP query API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "query.top_k")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show configuration file path
    Path,
}
