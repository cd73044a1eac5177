//! Configuration module for parlgraph.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, SummaryPrompts};
pub use settings::{
    EnrichmentSettings, EntitySettings, ExtractionSettings, GeneralSettings, GraphSettings,
    PipelineSettings, PromptSettings, QuerySettings, SegmentationSettings, Settings,
    StoreSettings,
};
