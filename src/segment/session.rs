//! Session date and ministry hints derived from video metadata.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<d>\d{1,2})[./-](?P<m>\d{1,2})[./-](?P<y>\d{4})\b").expect("Invalid regex")
});

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})\b").expect("Invalid regex"));

static DAY_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<d>\d{1,2})(?:st|nd|rd|th)?\s+(?P<m>[a-z]{3,9})\.?,?\s+(?P<y>\d{4})\b")
        .expect("Invalid regex")
});

static MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<m>[a-z]{3,9})\.?\s+(?P<d>\d{1,2})(?:st|nd|rd|th)?,?\s+(?P<y>\d{4})\b")
        .expect("Invalid regex")
});

static MINISTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ministry\s+of\s+[a-z][a-z&' ]*[a-z]|[a-z]+\s+ministry)\b").expect("Invalid regex")
});

/// Words after which a title stops describing the ministry.
const TITLE_STOPWORDS: &[&str] = &[" in ", " on ", " at ", " during ", " lok ", " rajya ", " session"];

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_lowercase();
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

/// Session date from the title, falling back to the publication date.
pub fn session_date(title: &str, published_at: Option<DateTime<Utc>>) -> Option<NaiveDate> {
    date_in_title(title).or_else(|| published_at.map(|dt| dt.date_naive()))
}

fn date_in_title(title: &str) -> Option<NaiveDate> {
    for re in [&*ISO_DATE_RE, &*NUMERIC_DATE_RE] {
        if let Some(caps) = re.captures(title) {
            let date = NaiveDate::from_ymd_opt(
                caps["y"].parse().ok()?,
                caps["m"].parse().ok()?,
                caps["d"].parse().ok()?,
            );
            if date.is_some() {
                return date;
            }
        }
    }

    for re in [&*DAY_MONTH_RE, &*MONTH_DAY_RE] {
        for caps in re.captures_iter(title) {
            let Some(month) = month_number(&caps["m"]) else {
                continue;
            };
            let (Ok(year), Ok(day)) = (caps["y"].parse(), caps["d"].parse()) else {
                continue;
            };
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }

    None
}

/// Raw ministry name mentioned in the title, if any.
pub fn ministry_hint(title: &str) -> Option<String> {
    let found = MINISTRY_RE.find(title)?.as_str();
    let lower = found.to_lowercase();

    let cut = TITLE_STOPWORDS
        .iter()
        .filter_map(|w| lower.find(w))
        .min()
        .unwrap_or(found.len());

    let hint = found[..cut].trim();
    (!hint.is_empty()).then(|| hint.to_string())
}
