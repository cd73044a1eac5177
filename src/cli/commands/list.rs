//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let store = store::open(&settings)?;

    match store.list_videos().await {
        Ok(videos) => {
            if videos.is_empty() {
                Output::info(
                    "No videos built yet. Use 'parlgraph ingest <source>' then 'parlgraph build'.",
                );
            } else {
                Output::header(&format!("Videos ({})", videos.len()));
                println!();

                for video in &videos {
                    Output::video_info(video);
                }

                let total_segments: usize = videos.iter().map(|v| v.segments.len()).sum();
                println!();
                Output::kv("Total videos", &videos.len().to_string());
                Output::kv("Total segments", &total_segments.to_string());
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list videos: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
