//! YouTube video ids and deep links.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static VIDEO_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Matches various YouTube URL formats and bare video IDs
    Regex::new(
        r"(?x)
        (?:
            (?:https?://)?
            (?:www\.|m\.)?
            (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/live/)
            ([a-zA-Z0-9_-]{11})
        )
        |
        ^([a-zA-Z0-9_-]{11})$
    ",
    )
    .expect("Invalid regex")
});

/// Extract an 11-character video id from a YouTube URL or a bare id.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if let Ok(url) = Url::parse(input) {
        let is_youtube = url
            .host_str()
            .is_some_and(|h| h.ends_with("youtube.com") || h == "youtu.be");
        if is_youtube {
            if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
                if is_video_id(&v) {
                    return Some(v.into_owned());
                }
            }
        }
    }

    let caps = VIDEO_ID_RE.captures(input)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

fn is_video_id(s: &str) -> bool {
    s.len() == 11
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Deep link to `seconds` into the video.
///
/// YouTube sources get a `&t=` parameter; anything else gets a media fragment.
pub fn uri_with_timestamp(video_id: &str, source_uri: &str, seconds: f64) -> String {
    let secs = seconds.max(0.0) as u64;
    let is_youtube = source_uri.is_empty()
        || source_uri.contains("youtube.com")
        || source_uri.contains("youtu.be");

    if is_youtube {
        format!("{}&t={}s", watch_url(video_id), secs)
    } else {
        format!("{}#t={}", source_uri, secs)
    }
}
