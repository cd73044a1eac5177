//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use crate::query::SearchFilters;
use anyhow::{Context, Result};
use chrono::NaiveDate;

fn parse_date(value: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .with_context(|| format!("--{} expects YYYY-MM-DD, got '{}'", flag, v))
        })
        .transpose()
}

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: Option<usize>,
    from: Option<&str>,
    to: Option<&str>,
    ministry: Option<&str>,
    keyword: bool,
    mut settings: Settings,
) -> Result<()> {
    let operation = if keyword { Operation::Lookup } else { Operation::Search };
    preflight::check(operation, &settings)?;

    if let Some(limit) = limit {
        settings.query.top_k = limit;
    }
    let filters = SearchFilters {
        date_from: parse_date(from, "from")?,
        date_to: parse_date(to, "to")?,
        ministry: ministry.map(str::to_string),
    };

    let engine = Pipeline::new(settings)?.query_engine();

    let spinner = Output::spinner("Searching...");
    let results = if keyword {
        engine.keyword_search(query, &filters).await
    } else {
        engine.search(query, &filters).await
    };
    spinner.finish_and_clear();

    if results.is_empty() {
        Output::warning("No results found matching your query.");
        return Ok(());
    }

    Output::success(&format!("Found {} results", results.len()));
    for record in &results {
        Output::search_result(record);
    }

    Ok(())
}
