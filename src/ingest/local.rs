//! Transcript provider backed by JSON files on disk.
//!
//! Accepts a single file or a directory. Within a directory, files are grouped
//! by video id:
//!
//! - `<id>.json` or `<id>_combined.json`: a full record (metadata + transcript)
//! - `<id>_meta.json`, `<id>_meta_partN.json`: metadata, merged key by key
//! - `<id>_partN.json`: transcript parts, concatenated in part order
//!
//! A file holding an array of records that carry their own `video_id` is read
//! as a bulk export.

use super::{extract_video_id, PlatformVideo, TranscriptCue, VideoPlatform};
use crate::error::{ParlError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

static PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<id>.+?)(?P<meta>_meta)?_part(?P<n>\d+)$").expect("Invalid regex")
});

/// Local JSON transcript provider.
pub struct JsonFileProvider {
    path: PathBuf,
    index: OnceCell<BTreeMap<String, PlatformVideo>>,
}

#[derive(Default)]
struct FileGroup {
    records: Vec<Value>,
    meta_parts: Vec<(u32, Value)>,
    transcript_parts: Vec<(u32, Value)>,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> Result<&BTreeMap<String, PlatformVideo>> {
        self.index.get_or_try_init(|| self.build_index()).await
    }

    async fn build_index(&self) -> Result<BTreeMap<String, PlatformVideo>> {
        let files = if self.path.is_dir() {
            let mut files = Vec::new();
            let mut entries = tokio::fs::read_dir(&self.path).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    files.push(path);
                }
            }
            files.sort();
            files
        } else if self.path.exists() {
            vec![self.path.clone()]
        } else {
            return Err(ParlError::NotFound(format!(
                "transcript path {} does not exist",
                self.path.display()
            )));
        };

        let mut groups: BTreeMap<String, FileGroup> = BTreeMap::new();
        for file in files {
            let content = tokio::fs::read_to_string(&file).await?;
            let value: Value = match serde_json::from_str(&content) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping {}: {}", file.display(), e);
                    continue;
                }
            };
            group_file(&file, value, &mut groups);
        }

        let mut index = BTreeMap::new();
        for (file_id, group) in groups {
            let record = assemble(group);
            let video = parse_record(&record, &file_id);
            if !video.has_transcript() {
                warn!("Skipping {}: no transcript", video.video_id);
                continue;
            }
            index.insert(video.video_id.clone(), video);
        }

        info!("Indexed {} videos from {}", index.len(), self.path.display());
        Ok(index)
    }
}

#[async_trait]
impl VideoPlatform for JsonFileProvider {
    fn name(&self) -> &str {
        "json-files"
    }

    async fn list_videos(&self) -> Result<Vec<String>> {
        Ok(self.index().await?.keys().cloned().collect())
    }

    async fn fetch_video(&self, video_id: &str) -> Result<PlatformVideo> {
        self.index()
            .await?
            .get(video_id)
            .cloned()
            .ok_or_else(|| ParlError::NotFound(format!("video {} not in {}", video_id, self.path.display())))
    }
}

fn group_file(file: &Path, value: Value, groups: &mut BTreeMap<String, FileGroup>) {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    if let Some(caps) = PART_RE.captures(&stem) {
        let id = caps["id"].to_string();
        let n = caps["n"].parse().unwrap_or(0);
        let group = groups.entry(id).or_default();
        if caps.name("meta").is_some() {
            group.meta_parts.push((n, value));
        } else {
            group.transcript_parts.push((n, value));
        }
        return;
    }

    if let Some(id) = stem.strip_suffix("_meta") {
        groups
            .entry(id.to_string())
            .or_default()
            .meta_parts
            .push((0, value));
        return;
    }

    let id = stem
        .strip_suffix("_combined")
        .unwrap_or(&stem)
        .to_string();

    match value {
        Value::Array(items) if items.first().is_some_and(|v| v.get("video_id").is_some()) => {
            debug!("Reading {} as a bulk export of {} records", file.display(), items.len());
            for item in items {
                let item_id = str_field(&item, &["video_id"]).unwrap_or_default();
                groups.entry(item_id).or_default().records.push(item);
            }
        }
        Value::Array(_) => groups.entry(id).or_default().transcript_parts.push((0, value)),
        other => groups.entry(id).or_default().records.push(other),
    }
}

/// Fold a file group into one record object.
fn assemble(mut group: FileGroup) -> Value {
    let mut record = Map::new();
    for value in group.records {
        if let Value::Object(map) = value {
            record.extend(map);
        }
    }

    group.meta_parts.sort_by_key(|(n, _)| *n);
    for (_, value) in group.meta_parts {
        if let Value::Object(map) = value {
            record.extend(map);
        }
    }

    if !group.transcript_parts.is_empty() {
        group.transcript_parts.sort_by_key(|(n, _)| *n);
        let mut transcript = Vec::new();
        for (_, value) in group.transcript_parts {
            match value {
                Value::Array(items) => transcript.extend(items),
                Value::Object(_) => transcript.push(value),
                _ => {}
            }
        }
        record.insert("transcript".to_string(), Value::Array(transcript));
    }

    Value::Object(record)
}

/// Parse a record in any of the accepted shapes.
fn parse_record(record: &Value, fallback_id: &str) -> PlatformVideo {
    let video_id = str_field(record, &["video_id", "videoId", "id"])
        .map(|id| extract_video_id(&id).unwrap_or(id))
        .unwrap_or_else(|| fallback_id.to_string());

    let mut transcript_segments = Vec::new();
    let mut transcript_text = None;
    for key in ["transcript_segments", "transcript", "processed_transcript", "raw_transcript_text"] {
        match record.get(key) {
            Some(Value::Array(items)) if transcript_segments.is_empty() => {
                transcript_segments = items.iter().filter_map(parse_cue).collect();
            }
            Some(Value::String(text)) if transcript_text.is_none() => {
                transcript_text = Some(text.clone());
            }
            _ => {}
        }
    }

    PlatformVideo {
        video_id,
        published_at: str_field(record, &["published_at", "publishedAt", "upload_date"])
            .and_then(|s| parse_timestamp(&s)),
        title: str_field(record, &["title"]).unwrap_or_default(),
        channel: str_field(record, &["channel", "channel_title", "channelTitle", "uploader"]),
        language: str_field(record, &["language", "lang", "defaultAudioLanguage"]),
        source_uri: str_field(record, &["source_uri", "url", "webpage_url"]),
        transcript_segments,
        transcript_text,
    }
}

fn parse_cue(value: &Value) -> Option<TranscriptCue> {
    let text = str_field(value, &["text", "#text"])?;
    let start_ts = num_field(value, &["start_ts", "start", "@start"]);
    let end_ts = num_field(value, &["end_ts", "end", "@end"]).or_else(|| {
        let duration = num_field(value, &["duration", "dur", "@dur"])?;
        Some(start_ts? + duration)
    });

    Some(TranscriptCue {
        start_ts,
        end_ts,
        speaker_raw: str_field(value, &["speaker_raw", "speaker"]),
        text,
    })
}

/// First string field among `keys`, looking inside a nested `metadata` object too.
fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    let nested = value.get("metadata");
    keys.iter()
        .find_map(|k| {
            value
                .get(*k)
                .or_else(|| nested.and_then(|m| m.get(*k)))
                .and_then(|v| v.as_str())
        })
        .map(|s| s.to_string())
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn num_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match value.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    ["%Y-%m-%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_combined_record() {
        let record = json!({
            "video_id": "https://youtu.be/dQw4w9WgXcQ",
            "title": "Rajya Sabha 12.02.2024",
            "channel": "Sansad TV",
            "upload_date": "20240212",
            "transcript": [
                {"text": "Hon. members,", "start": 1.5, "duration": 2.0},
                {"#text": "please be seated", "@start": "3.5", "@dur": "1.25"}
            ]
        });

        let video = parse_record(&record, "fallback");
        assert_eq!(video.video_id, "dQw4w9WgXcQ");
        assert_eq!(video.transcript_segments.len(), 2);
        assert_eq!(video.transcript_segments[0].end_ts, Some(3.5));
        assert_eq!(video.transcript_segments[1].start_ts, Some(3.5));
        assert_eq!(video.transcript_segments[1].end_ts, Some(4.75));
        assert_eq!(
            video.published_at.map(|d| d.date_naive().to_string()).as_deref(),
            Some("2024-02-12")
        );
    }

    #[test]
    fn test_plain_transcript_text() {
        let record = json!({"title": "x", "transcript": "[0] Order, order.\n[4] The house will come to order."});
        let video = parse_record(&record, "abcdefghijk");
        assert_eq!(video.video_id, "abcdefghijk");
        assert!(video.transcript_segments.is_empty());
        assert!(video.has_transcript());
    }

    #[tokio::test]
    async fn test_directory_with_parts() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, value: Value| {
            std::fs::write(dir.path().join(name), value.to_string()).unwrap();
        };
        write("vid00000001_meta.json", json!({"title": "Session", "channel": "Sansad TV"}));
        write("vid00000001_part2.json", json!([{"text": "second", "start": 10.0, "duration": 2.0}]));
        write("vid00000001_part1.json", json!([{"text": "first", "start": 0.0, "duration": 2.0}]));
        write("vid00000002.json", json!({"title": "No transcript"}));

        let provider = JsonFileProvider::new(dir.path());
        assert_eq!(provider.list_videos().await.unwrap(), vec!["vid00000001"]);

        let video = provider.fetch_video("vid00000001").await.unwrap();
        let texts: Vec<_> = video.transcript_segments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(video.title, "Session");

        assert!(matches!(
            provider.fetch_video("vid00000002").await,
            Err(ParlError::NotFound(_))
        ));
    }
}
