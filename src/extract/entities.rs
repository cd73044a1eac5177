//! Entity mentions in statement text: ministries, bills and topics.

use super::normalize::{normalize_label, EntityResolver};
use crate::graph::NodeType;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// `Ministry of Health`, `Minister for Home Affairs` in properly cased text.
static MINISTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b[Mm]inist(?:ry|er)\s+(?:of|for)\s+(?P<domain>[A-Z][a-z]+(?:\s+(?:(?:and|&)\s+)?[A-Z][a-z]+)*)",
    )
    .expect("Invalid regex")
});

/// `Digital Personal Data Protection Bill, 2023` and similar.
static BILL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<name>(?:[A-Z][\w'()-]*\s+){1,8}(?:\([A-Za-z ]+\)\s+)?Bill(?:,?\s+\d{4})?)")
        .expect("Invalid regex")
});

/// Domains recognised in lowercase text such as auto-generated captions.
const MINISTRY_DOMAINS: &[&str] = &[
    "health",
    "finance",
    "home affairs",
    "external affairs",
    "defence",
    "education",
    "railways",
    "agriculture",
    "law and justice",
    "commerce",
    "labour",
    "environment",
];

/// Leading words that make a capitalized phrase a reference rather than a bill name.
const BILL_DETERMINERS: &[&str] = &["this", "that", "the", "a", "any", "each", "every", "our", "your", "which"];

/// Finds entity mentions and returns them canonicalized.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    resolver: EntityResolver,
    topics: Vec<(Regex, String)>,
    ministries: Vec<(Regex, String)>,
}

/// A mention resolved to its canonical label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mention {
    pub canonical_label: String,
    pub surface: String,
}

impl EntityMatcher {
    pub fn new(resolver: EntityResolver, topics: &[String]) -> Self {
        // Every topic alias is matched too, and resolves to its topic.
        let topic_set: BTreeSet<String> = topics.iter().map(|t| normalize_label(t)).collect();
        let mut terms: BTreeSet<String> = topic_set.clone();
        for (alias, canonical) in resolver.aliases() {
            if topic_set.contains(canonical) {
                terms.insert(alias.clone());
            }
        }
        let topics = terms
            .into_iter()
            .filter(|t| !t.is_empty())
            .filter_map(|term| Some((word_regex(&term)?, term)))
            .collect();

        let mut domains: BTreeSet<String> = MINISTRY_DOMAINS.iter().map(|d| d.to_string()).collect();
        for (alias, canonical) in resolver.aliases() {
            for label in [alias, canonical] {
                if let Some(domain) = label.strip_prefix("ministry of ") {
                    domains.insert(domain.to_string());
                }
            }
        }
        let ministries = domains
            .into_iter()
            .filter_map(|domain| {
                let escaped = regex::escape(&domain);
                let re = Regex::new(&format!(
                    r"(?i)\b(?:minist(?:ry|er)\s+(?:of|for)\s+{d}|{d}\s+ministry)\b",
                    d = escaped
                ))
                .ok()?;
                Some((re, format!("ministry of {}", domain)))
            })
            .collect();

        Self {
            resolver,
            topics,
            ministries,
        }
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// First ministry mentioned in `text`.
    pub fn ministry(&self, text: &str) -> Option<Mention> {
        let cased = MINISTRY_RE.captures(text).and_then(|caps| {
            let surface = caps.get(0)?.as_str().to_string();
            let label = self
                .resolver
                .canonicalize(NodeType::Ministry, &format!("ministry of {}", &caps["domain"]))?;
            Some((caps.get(0)?.start(), Mention { canonical_label: label, surface }))
        });

        let known = self
            .ministries
            .iter()
            .filter_map(|(re, label)| {
                let m = re.find(text)?;
                let canonical = self.resolver.canonicalize(NodeType::Ministry, label)?;
                Some((
                    m.start(),
                    Mention {
                        canonical_label: canonical,
                        surface: m.as_str().to_string(),
                    },
                ))
            })
            .min_by_key(|(start, _)| *start);

        [cased, known]
            .into_iter()
            .flatten()
            .min_by_key(|(start, _)| *start)
            .map(|(_, mention)| mention)
    }

    /// Distinct topics mentioned in `text`, sorted by canonical label.
    pub fn topics(&self, text: &str) -> Vec<Mention> {
        let mut found: BTreeSet<Mention> = BTreeSet::new();
        for (re, term) in &self.topics {
            if let Some(m) = re.find(text) {
                if let Some(label) = self.resolver.canonicalize(NodeType::Topic, term) {
                    found.insert(Mention {
                        canonical_label: label,
                        surface: m.as_str().to_string(),
                    });
                }
            }
        }
        dedup_by_label(found)
    }

    /// Distinct bills named in `text`.
    pub fn bills(&self, text: &str) -> Vec<Mention> {
        let mut found: BTreeSet<Mention> = BTreeSet::new();
        for caps in BILL_RE.captures_iter(text) {
            let surface = trim_determiners(&caps["name"]);
            if surface.split_whitespace().count() < 2 {
                continue;
            }
            if let Some(label) = self.resolver.canonicalize(NodeType::Bill, &surface) {
                found.insert(Mention {
                    canonical_label: label,
                    surface,
                });
            }
        }
        dedup_by_label(found)
    }
}

fn word_regex(term: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term))).ok()
}

fn trim_determiners(name: &str) -> String {
    let mut words: Vec<&str> = name.split_whitespace().collect();
    while words.len() > 1 && BILL_DETERMINERS.contains(&words[0].to_lowercase().as_str()) {
        words.remove(0);
    }
    words.join(" ")
}

/// Keep one mention per canonical label (the first by surface order).
fn dedup_by_label(found: BTreeSet<Mention>) -> Vec<Mention> {
    let mut out: Vec<Mention> = Vec::new();
    for mention in found {
        if out.last().map(|m| &m.canonical_label) != Some(&mention.canonical_label) {
            out.push(mention);
        }
    }
    out
}
