//! Text and language-tag cleanup applied at ingestion.

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("Invalid regex"));

/// Named entities decoded at ingestion. `&amp;` goes last so `&amp;lt;` stays `&lt;`.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&nbsp;", " "),
    ("&amp;", "&"),
];

/// Strip markup, decode entities and collapse whitespace.
pub fn clean_text(input: &str) -> String {
    let without_tags = TAG_RE.replace_all(input, " ");

    let decoded = NUMERIC_ENTITY_RE.replace_all(&without_tags, |caps: &regex::Captures| {
        let code = &caps[1];
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        parsed
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    let mut text = decoded.into_owned();
    for (entity, replacement) in NAMED_ENTITIES {
        text = text.replace(entity, replacement);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a BCP-47-ish language tag: lowercase, `-` separated, `und` when unknown.
pub fn normalize_language(tag: &str) -> String {
    let tag = tag.trim().replace('_', "-").to_lowercase();
    if tag.is_empty() {
        "und".to_string()
    } else {
        tag
    }
}
