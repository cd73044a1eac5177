//! CLI command implementations.

mod build;
mod config;
mod export;
mod ingest;
mod list;
mod lookup;
mod reembed;
mod search;
mod serve;
mod stats;

pub use build::run_build;
pub use config::run_config;
pub use export::run_export;
pub use ingest::run_ingest;
pub use list::run_list;
pub use lookup::run_lookup;
pub use reembed::run_reembed;
pub use search::run_search;
pub use serve::run_serve;
pub use stats::run_stats;
