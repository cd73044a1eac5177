//! Canonical labels for entity names.
//!
//! Node identity is derived from `(type, canonical_label)`, so every name goes
//! through [`normalize_label`] and [`EntityResolver::canonicalize`] before it
//! reaches the graph.

use crate::graph::NodeType;
use crate::segment::UNKNOWN_SPEAKER;
use std::collections::HashMap;

/// Case-fold, collapse whitespace, unify quotes and strip trailing punctuation.
pub fn normalize_label(raw: &str) -> String {
    let unified: String = raw
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c => c,
        })
        .collect();

    let collapsed = unified
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    collapsed
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim_end_matches(['.', ',', ';', ':', '!', '?'])
        .trim()
        .to_string()
}

/// Honorifics dropped from speaker labels. Academic titles are kept.
const HONORIFICS: &[&str] = &["hon.", "hon", "hon'ble", "honourable", "honorable"];

/// Words kept lowercase by [`display_case`] unless they open the name.
const MINOR_WORDS: &[&str] = &["of", "and", "for", "the", "in", "on", "&"];

/// Title-case a canonical label for display.
pub fn display_case(label: &str) -> String {
    label
        .split(' ')
        .enumerate()
        .map(|(i, word)| {
            if i > 0 && MINOR_WORDS.contains(&word) {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves raw entity names to canonical labels using known aliases.
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    aliases: HashMap<String, String>,
}

impl EntityResolver {
    /// Alias keys and values are normalized on the way in.
    pub fn new(aliases: &HashMap<String, String>) -> Self {
        Self {
            aliases: aliases
                .iter()
                .map(|(k, v)| (normalize_label(k), normalize_label(v)))
                .collect(),
        }
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&String, &String)> {
        self.aliases.iter()
    }

    fn alias(&self, label: String) -> String {
        self.aliases.get(&label).cloned().unwrap_or(label)
    }

    /// Canonical label for `raw` as an entity of `kind`, or `None` when the
    /// name is empty or unknown.
    pub fn canonicalize(&self, kind: NodeType, raw: &str) -> Option<String> {
        let label = normalize_label(raw);
        if label.is_empty() || label == UNKNOWN_SPEAKER {
            return None;
        }

        let label = match kind {
            NodeType::Speaker => strip_honorifics(&label),
            NodeType::Ministry => ministry_form(&self.alias(label)),
            NodeType::Bill => label.strip_prefix("the ").map(str::to_string).unwrap_or(label),
            _ => label,
        };

        let label = self.alias(label);
        (!label.is_empty()).then_some(label)
    }
}

fn strip_honorifics(label: &str) -> String {
    let mut rest = label;
    loop {
        let Some((first, tail)) = rest.split_once(' ') else {
            return rest.to_string();
        };
        if HONORIFICS.contains(&first) {
            rest = tail.trim_start();
        } else {
            return rest.to_string();
        }
    }
}

/// Rewrite the common ways of naming a ministry to `ministry of <domain>`.
fn ministry_form(label: &str) -> String {
    for prefix in ["minister of ", "minister for ", "ministry for ", "union minister of "] {
        if let Some(domain) = label.strip_prefix(prefix) {
            return format!("ministry of {}", domain);
        }
    }
    if let Some(domain) = label.strip_suffix(" ministry") {
        let domain = domain.strip_prefix("the ").unwrap_or(domain);
        return format!("ministry of {}", domain);
    }
    label.to_string()
}
