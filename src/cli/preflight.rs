//! Pre-flight checks before expensive operations.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{ParlError, Result};
use std::path::Path;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingestion reads local transcript files.
    Ingest,
    /// Building summarizes and embeds, so it needs the API key.
    Build,
    /// Semantic search embeds the query.
    Search,
    /// Keyword and entity lookups only read the store.
    Lookup,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    settings.validate()?;
    match operation {
        Operation::Build | Operation::Search => check_api_key()?,
        Operation::Ingest | Operation::Lookup => {}
    }
    Ok(())
}

/// Check that a transcript source exists.
pub fn check_source(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ParlError::InvalidInput(format!(
            "transcript source {} does not exist",
            path.display()
        )))
    }
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    if crate::openai::is_api_key_configured() {
        Ok(())
    } else {
        Err(ParlError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_lookup_no_requirements() {
        assert!(check(Operation::Lookup, &Settings::default()).is_ok());
    }

    #[test]
    fn test_missing_source() {
        assert!(check_source(Path::new("/definitely/not/here.json")).is_err());
    }
}
