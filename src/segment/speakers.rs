//! Speaker-change markers inside transcript text.

use regex::Regex;
use std::sync::LazyLock;

/// Speaker label used when a turn has no attributable speaker.
pub const UNKNOWN_SPEAKER: &str = "unknown";

/// Only this many leading characters are searched for a `Name:` prefix.
const MAX_PREFIX_CHARS: usize = 64;

static NAMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<name>
            (?:(?:Hon|Hon'ble|Honourable|Dr|Mr|Mrs|Ms|Shri|Smt|Sri|Kumari|Prof|Adv)\.?\s+)?
            [A-Z][\w.'-]*
            (?:\s+[A-Z][\w.'-]*){0,5}
        )
        \s*:\s*
        (?P<rest>.*)$
    ",
    )
    .expect("Invalid regex")
});

/// Capitalized prefixes that look like names but introduce ordinary text.
const NOT_SPEAKERS: &[&str] = &[
    "note", "question", "answer", "translation", "subject", "agenda", "time", "re",
];

/// A detected speaker change.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// `None` for an anonymous turn change (`>>`).
    pub speaker: Option<String>,
    /// Text after the marker.
    pub rest: String,
}

/// Detect a speaker-change marker at the start of `text`.
pub fn detect_marker(text: &str) -> Option<Marker> {
    let text = text.trim_start();

    if let Some(after) = text.strip_prefix(">>") {
        let after = after.trim_start();
        return Some(match named_prefix(after) {
            Some(named) => named,
            None => Marker {
                speaker: None,
                rest: after.to_string(),
            },
        });
    }

    named_prefix(text)
}

fn named_prefix(text: &str) -> Option<Marker> {
    let colon = text.find(':')?;
    if colon > MAX_PREFIX_CHARS {
        return None;
    }

    let caps = NAMED_RE.captures(text)?;
    let name = caps["name"].trim().to_string();
    if NOT_SPEAKERS.contains(&name.to_lowercase().as_str()) {
        return None;
    }

    Some(Marker {
        speaker: Some(name),
        rest: caps["rest"].trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_markers() {
        let m = detect_marker("Dr. X: The vaccination drive has begun.").unwrap();
        assert_eq!(m.speaker.as_deref(), Some("Dr. X"));
        assert_eq!(m.rest, "The vaccination drive has begun.");

        let m = detect_marker("SHRI RAHUL GANDHI: Sir, I rise").unwrap();
        assert_eq!(m.speaker.as_deref(), Some("SHRI RAHUL GANDHI"));
    }

    #[test]
    fn test_anonymous_marker() {
        let m = detect_marker(">> thank you, madam speaker").unwrap();
        assert_eq!(m.speaker, None);
        assert_eq!(m.rest, "thank you, madam speaker");

        let m = detect_marker(">> Mr. Speaker: order").unwrap();
        assert_eq!(m.speaker.as_deref(), Some("Mr. Speaker"));
    }

    #[test]
    fn test_plain_text_has_no_marker() {
        assert_eq!(detect_marker("the ministry said: no"), None);
        assert_eq!(detect_marker("Question: when will beds be added"), None);
        assert_eq!(detect_marker("No colon here"), None);
    }
}
