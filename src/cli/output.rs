//! CLI output formatting utilities.

use crate::query::ResultRecord;
use crate::segment::Video;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one line per built video.
    pub fn video_info(video: &Video) {
        let date = video
            .session_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());
        println!(
            "  {} {} ({}, {}, {} segments, {})",
            style("*").cyan(),
            style(&video.title).bold(),
            style(&video.video_id).dim(),
            date,
            video.segments.len(),
            format_duration(video.duration())
        );
    }

    /// Print a search result.
    pub fn search_result(record: &ResultRecord) {
        let title = record.video_title.as_deref().unwrap_or(&record.video_id);
        println!(
            "\n{} {} @ {} (score: {:.2})",
            style(">>").green(),
            style(title).bold(),
            style(format_timestamp(record.start_ts)).cyan(),
            record.score
        );

        let who = match (&record.speaker, &record.ministry) {
            (Some(speaker), Some(ministry)) => Some(format!("{}, {}", speaker, ministry)),
            (Some(speaker), None) => Some(speaker.clone()),
            (None, Some(ministry)) => Some(ministry.clone()),
            (None, None) => None,
        };
        if let Some(who) = who {
            println!("   {}", style(who).italic());
        }
        if let Some(date) = record.session_date {
            println!("   {}", style(format!("Session {}", date)).dim());
        }

        match &record.summary {
            Some(summary) => println!("   {}", content_preview(summary, 200)),
            None => println!("   {}", content_preview(&record.snippet, 200)),
        }
        println!("   {}", style(&record.video_uri_with_timestamp).dim());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format seconds as `mm:ss` or `h:mm:ss`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format duration in seconds to a human-readable string.
fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(83.9), "01:23");
        assert_eq!(format_timestamp(3723.0), "1:02:03");
    }

    #[test]
    fn test_content_preview_is_char_safe() {
        let text = "मंत्री ने कहा".repeat(40);
        assert!(content_preview(&text, 10).ends_with("..."));
    }
}
