//! Transcript segmentation.
//!
//! Turns a [`RawVideo`] into a [`Video`]: an ordered, contiguous sequence of
//! speech and silence segments, split on speaker changes where the transcript
//! marks them and on fixed time windows otherwise.

mod session;
mod speakers;

pub use session::{ministry_hint, session_date};
pub use speakers::{detect_marker, Marker, UNKNOWN_SPEAKER};

use crate::config::SegmentationSettings;
use crate::error::{ParlError, Result};
use crate::ingest::{RawVideo, TranscriptCue};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, instrument};

/// `[103] sentence` or `103 sentence`: one start-timed line of a processed transcript.
static TIMED_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[(?P<b>\d+(?:\.\d+)?)\]|(?P<n>\d+(?:\.\d+)?)\s)\s*(?P<text>.*)$")
        .expect("Invalid regex")
});

/// Whether a segment carries speech or marks a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Speech,
    Silence,
}

/// A time-aligned piece of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_ts: f64,
    pub end_ts: f64,
    pub speaker_raw: String,
    pub text: String,
    pub kind: SegmentKind,
}

impl Segment {
    pub fn is_silence(&self) -> bool {
        self.kind == SegmentKind::Silence
    }

    fn silence(start_ts: f64, end_ts: f64) -> Self {
        Self {
            start_ts,
            end_ts,
            speaker_raw: String::new(),
            text: String::new(),
            kind: SegmentKind::Silence,
        }
    }
}

/// A segmented video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub video_id: String,
    pub title: String,
    pub channel: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_uri: String,
    pub language: String,
    pub session_date: Option<NaiveDate>,
    pub ministry_hint: Option<String>,
    pub segments: Vec<Segment>,
}

impl Video {
    /// Append segments that start at or after the current end of the video.
    ///
    /// Existing segments are never touched, so statement ids derived from them
    /// stay stable. Returns how many segments were appended.
    pub fn append_segments(&mut self, segments: Vec<Segment>) -> usize {
        let end = self.segments.last().map(|s| s.end_ts).unwrap_or(f64::NEG_INFINITY);
        let before = self.segments.len();
        self.segments
            .extend(segments.into_iter().filter(|s| s.start_ts >= end));
        self.segments.len() - before
    }

    pub fn duration(&self) -> f64 {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => last.end_ts - first.start_ts,
            _ => 0.0,
        }
    }
}

/// A cue with resolved timing and speaker.
#[derive(Debug, Clone)]
struct TimedCue {
    start: f64,
    end: f64,
    /// Speaker that starts a new turn at this cue, if any.
    turn: Option<String>,
    text: String,
}

/// Splits raw transcripts into segments.
pub struct Segmenter {
    settings: SegmentationSettings,
}

impl Segmenter {
    pub fn new(settings: SegmentationSettings) -> Self {
        Self { settings }
    }

    /// Segment a raw video. Fails when the transcript carries no timing.
    #[instrument(skip(self, raw), fields(video_id = %raw.video_id))]
    pub fn segment(&self, raw: &RawVideo) -> Result<Video> {
        let cues = if raw.cues.is_empty() {
            parse_timed_lines(&raw.video_id, &raw.raw_transcript_text)?
        } else {
            timed_cues(&raw.video_id, &raw.cues)?
        };

        let has_markers = cues.iter().any(|c| c.turn.is_some());
        let speech = self.group(&cues, has_markers);
        let segments = self.make_contiguous(speech);

        debug!(
            "Segmented {} into {} segments ({})",
            raw.video_id,
            segments.len(),
            if has_markers { "speaker turns" } else { "fixed windows" }
        );

        Ok(Video {
            video_id: raw.video_id.clone(),
            title: raw.title.clone(),
            channel: raw.channel.clone(),
            published_at: raw.published_at,
            source_uri: raw.source_uri.clone(),
            language: raw.language.clone(),
            session_date: session_date(&raw.title, raw.published_at),
            ministry_hint: ministry_hint(&raw.title),
            segments,
        })
    }

    /// Fold cues into speech segments. A segment closes on a speaker change, a
    /// gap above the threshold, or once it spans the window length.
    fn group(&self, cues: &[TimedCue], has_markers: bool) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut speaker = UNKNOWN_SPEAKER.to_string();
        let mut current: Option<Segment> = None;

        for cue in cues {
            let turn_change = has_markers && cue.turn.is_some();
            if let Some(name) = &cue.turn {
                speaker = name.clone();
            }

            let close = match &current {
                Some(seg) => {
                    turn_change
                        || cue.start - seg.end_ts > self.settings.gap_threshold_seconds
                        || cue.start - seg.start_ts >= self.settings.window_seconds
                }
                None => false,
            };
            if close {
                segments.extend(current.take());
            }

            match current.as_mut() {
                Some(seg) => {
                    if !cue.text.is_empty() {
                        if !seg.text.is_empty() {
                            seg.text.push(' ');
                        }
                        seg.text.push_str(&cue.text);
                    }
                    seg.end_ts = seg.end_ts.max(cue.end);
                }
                None => {
                    current = Some(Segment {
                        start_ts: cue.start,
                        end_ts: cue.end,
                        speaker_raw: speaker.clone(),
                        text: cue.text.clone(),
                        kind: SegmentKind::Speech,
                    })
                }
            }
        }
        segments.extend(current);
        segments.retain(|s| !s.text.is_empty());
        segments
    }

    /// Close small gaps and turn large ones into explicit silence segments.
    fn make_contiguous(&self, speech: Vec<Segment>) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::with_capacity(speech.len());
        for seg in speech {
            if let Some(prev) = out.last_mut() {
                let gap = seg.start_ts - prev.end_ts;
                if gap > self.settings.gap_threshold_seconds {
                    let start = prev.end_ts;
                    out.push(Segment::silence(start, seg.start_ts));
                } else if gap > 0.0 {
                    prev.end_ts = seg.start_ts;
                }
            }
            out.push(seg);
        }
        out
    }
}

/// Resolve timing for platform cues: sort, fill missing ends, clamp overlaps.
fn timed_cues(video_id: &str, cues: &[TranscriptCue]) -> Result<Vec<TimedCue>> {
    let mut timed = Vec::with_capacity(cues.len());
    for (i, cue) in cues.iter().enumerate() {
        let start = cue.start_ts.ok_or_else(|| ParlError::Segmentation {
            video_id: video_id.to_string(),
            reason: format!("cue {} has no start time", i),
        })?;

        let (turn, text) = match (&cue.speaker_raw, detect_marker(&cue.text)) {
            (Some(speaker), marker) => (
                Some(speaker.clone()),
                marker.map(|m| m.rest).unwrap_or_else(|| cue.text.clone()),
            ),
            (None, Some(marker)) => (
                Some(marker.speaker.unwrap_or_else(|| UNKNOWN_SPEAKER.to_string())),
                marker.rest,
            ),
            (None, None) => (None, cue.text.clone()),
        };

        timed.push(TimedCue {
            start,
            end: cue.end_ts.unwrap_or(f64::NAN),
            turn,
            text,
        });
    }

    finish_timing(video_id, timed)
}

/// Parse a processed transcript of `[seconds] text` lines. Lines without a
/// timestamp continue the previous line.
fn parse_timed_lines(video_id: &str, text: &str) -> Result<Vec<TimedCue>> {
    let mut timed: Vec<TimedCue> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parsed = TIMED_LINE_RE.captures(line).and_then(|caps| {
            let ts = caps.name("b").or_else(|| caps.name("n"))?.as_str().parse::<f64>().ok()?;
            Some((ts, caps["text"].trim().to_string()))
        });

        match (parsed, timed.last_mut()) {
            (Some((start, body)), _) => {
                let (turn, body) = match detect_marker(&body) {
                    Some(marker) => (
                        Some(marker.speaker.unwrap_or_else(|| UNKNOWN_SPEAKER.to_string())),
                        marker.rest,
                    ),
                    None => (None, body),
                };
                timed.push(TimedCue {
                    start,
                    end: f64::NAN,
                    turn,
                    text: body,
                });
            }
            (None, Some(prev)) => {
                prev.text.push(' ');
                prev.text.push_str(line);
            }
            (None, None) => {
                return Err(ParlError::Segmentation {
                    video_id: video_id.to_string(),
                    reason: "transcript has no timing metadata".to_string(),
                });
            }
        }
    }

    if timed.is_empty() {
        return Err(ParlError::Segmentation {
            video_id: video_id.to_string(),
            reason: "transcript is empty".to_string(),
        });
    }

    finish_timing(video_id, timed)
}

fn finish_timing(video_id: &str, mut timed: Vec<TimedCue>) -> Result<Vec<TimedCue>> {
    if timed.iter().any(|c| !c.start.is_finite() || c.start < 0.0) {
        return Err(ParlError::Segmentation {
            video_id: video_id.to_string(),
            reason: "cue start times must be finite and non-negative".to_string(),
        });
    }

    timed.sort_by(|a, b| a.start.total_cmp(&b.start));

    let starts: Vec<f64> = timed.iter().map(|c| c.start).collect();
    for (i, cue) in timed.iter_mut().enumerate() {
        let next_start = starts.get(i + 1).copied();
        if !cue.end.is_finite() {
            cue.end = next_start.unwrap_or_else(|| cue.start + estimated_duration(&cue.text));
        }
        if let Some(next) = next_start {
            if cue.end > next && next >= cue.start {
                cue.end = next;
            }
        }
        cue.end = cue.end.max(cue.start);
    }

    Ok(timed)
}

/// Rough speaking time for an untimed trailing line.
fn estimated_duration(text: &str) -> f64 {
    (text.split_whitespace().count() as f64 * 0.4).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(cues: Vec<TranscriptCue>, text: &str) -> RawVideo {
        RawVideo {
            video_id: "v1".to_string(),
            published_at: None,
            raw_transcript_text: text.to_string(),
            language: "en".to_string(),
            source_uri: "https://www.youtube.com/watch?v=v1".to_string(),
            title: "Lok Sabha 12.02.2024 - Ministry of Health".to_string(),
            channel: None,
            cues,
        }
    }

    fn cue(start: f64, end: f64, text: &str) -> TranscriptCue {
        TranscriptCue {
            start_ts: Some(start),
            end_ts: Some(end),
            speaker_raw: None,
            text: text.to_string(),
        }
    }

    fn segmenter() -> Segmenter {
        Segmenter::new(SegmentationSettings {
            window_seconds: 30.0,
            gap_threshold_seconds: 10.0,
        })
    }

    fn assert_contiguous(video: &Video) {
        for pair in video.segments.windows(2) {
            assert_eq!(pair[0].end_ts, pair[1].start_ts);
        }
    }

    #[test]
    fn test_speaker_turns() {
        let video = segmenter()
            .segment(&raw(
                vec![
                    cue(0.0, 4.0, "Dr. X: The vaccination rollout"),
                    cue(4.0, 8.0, "has reached every district."),
                    cue(9.0, 12.0, ">> Thank you."),
                ],
                "",
            ))
            .unwrap();

        assert_eq!(video.segments.len(), 2);
        assert_eq!(video.segments[0].speaker_raw, "Dr. X");
        assert_eq!(
            video.segments[0].text,
            "The vaccination rollout has reached every district."
        );
        assert_eq!(video.segments[1].speaker_raw, UNKNOWN_SPEAKER);
        assert_eq!(video.session_date, NaiveDate::from_ymd_opt(2024, 2, 12));
        assert_eq!(video.ministry_hint.as_deref(), Some("Ministry of Health"));
        assert_contiguous(&video);
    }

    #[test]
    fn test_fixed_windows_without_markers() {
        let cues = (0..8)
            .map(|i| cue(i as f64 * 10.0, i as f64 * 10.0 + 10.0, "words"))
            .collect();
        let video = segmenter().segment(&raw(cues, "")).unwrap();

        assert_eq!(video.segments.len(), 3);
        assert!(video.segments.iter().all(|s| s.speaker_raw == UNKNOWN_SPEAKER));
        assert_eq!(video.segments[0].end_ts, 30.0);
        assert_contiguous(&video);
    }

    #[test]
    fn test_long_gap_becomes_silence() {
        let video = segmenter()
            .segment(&raw(
                vec![cue(0.0, 5.0, "before the break"), cue(60.0, 65.0, "after the break")],
                "",
            ))
            .unwrap();

        let kinds: Vec<_> = video.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SegmentKind::Speech, SegmentKind::Silence, SegmentKind::Speech]
        );
        assert_eq!(video.segments[1].start_ts, 5.0);
        assert_eq!(video.segments[1].end_ts, 60.0);
    }

    #[test]
    fn test_overlapping_cues_are_clamped() {
        let video = segmenter()
            .segment(&raw(
                vec![cue(0.0, 6.0, "A: first"), cue(4.0, 8.0, "B: second")],
                "",
            ))
            .unwrap();
        assert_eq!(video.segments[0].end_ts, 4.0);
        assert_contiguous(&video);
    }

    #[test]
    fn test_untimed_cue_fails() {
        let mut untimed = cue(0.0, 1.0, "hello");
        untimed.start_ts = None;
        let err = segmenter().segment(&raw(vec![untimed], "")).unwrap_err();
        assert!(matches!(err, ParlError::Segmentation { .. }));
    }

    #[test]
    fn test_processed_transcript_lines() {
        let video = segmenter()
            .segment(&raw(
                vec![],
                "[0] Order, order.\n[3] Dr. X: The house will\ncome to order.\n[7] >> Thank you.",
            ))
            .unwrap();
        assert_eq!(video.segments.len(), 3);
        assert_eq!(video.segments[1].text, "The house will come to order.");
        assert_eq!(video.segments[1].end_ts, 7.0);
    }

    #[test]
    fn test_plain_text_without_timing_fails() {
        let err = segmenter()
            .segment(&raw(vec![], "Just some words\nwith no timing"))
            .unwrap_err();
        assert_eq!(err.kind(), "segmentation_error");
    }

    #[test]
    fn test_append_segments_keeps_existing() {
        let mut video = segmenter()
            .segment(&raw(vec![cue(0.0, 5.0, "first")], ""))
            .unwrap();
        let more = vec![
            Segment {
                start_ts: 2.0,
                end_ts: 4.0,
                speaker_raw: UNKNOWN_SPEAKER.into(),
                text: "overlaps".into(),
                kind: SegmentKind::Speech,
            },
            Segment {
                start_ts: 5.0,
                end_ts: 9.0,
                speaker_raw: UNKNOWN_SPEAKER.into(),
                text: "new".into(),
                kind: SegmentKind::Speech,
            },
        ];
        assert_eq!(video.append_segments(more), 1);
        assert_eq!(video.segments.last().map(|s| s.text.as_str()), Some("new"));
    }
}
