//! # Interest Score Estimator
//! Pure arithmetic that maps one raw item + its engagement metadata to a
//! single "attention magnitude" (an estimated view count).
//!
//! No I/O and no model calls: the same item always yields the same value,
//! bounded to `[0, MAX_INTEREST]`.

use serde_json::Value;

use crate::model::RawItem;

/// Upper bound for a single item's interest.
pub const MAX_INTEREST: i64 = 10_000_000_000;

/// Value used for unknown source types.
pub const UNKNOWN_SOURCE_INTEREST: i64 = 100;

const REDDIT_UPVOTE_FACTOR: i64 = 15;
const REDDIT_COMMENT_FACTOR: i64 = 5;
const GITHUB_STAR_FACTOR: i64 = 20;
const GITHUB_FORK_FACTOR: i64 = 10;
const GITHUB_WATCHER_FACTOR: i64 = 3;
const NEWS_COMMENT_FACTOR: i64 = 50;

const NEWS_BASE: i64 = 100;
const NEWS_URGENCY_POINTS: i64 = 15;
const NEWS_CONTENT_CAP: i64 = 20;
const URGENCY_KEYWORDS: [&str; 6] = ["breaking", "urgent", "major", "crisis", "alert", "important"];

/// Source families with a dedicated formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Youtube,
    Reddit,
    Github,
    News,
    Other,
}

impl SourceKind {
    pub fn parse(source_type: &str) -> Self {
        match source_type.trim().to_ascii_lowercase().as_str() {
            "youtube" => SourceKind::Youtube,
            "reddit" => SourceKind::Reddit,
            "github" => SourceKind::Github,
            "news" => SourceKind::News,
            _ => SourceKind::Other,
        }
    }
}

/// Estimate the interest magnitude of one item.
pub fn estimate(item: &RawItem) -> i64 {
    let attr = |key: &str| attribute_count(item.attributes.get(key));

    let raw = match SourceKind::parse(&item.source_type) {
        SourceKind::Youtube => attr("views"),
        SourceKind::Reddit => weighted(&[
            (attr("upvotes"), REDDIT_UPVOTE_FACTOR),
            (attr("comments"), REDDIT_COMMENT_FACTOR),
        ]),
        SourceKind::Github => weighted(&[
            (attr("stars"), GITHUB_STAR_FACTOR),
            (attr("forks"), GITHUB_FORK_FACTOR),
            (attr("watchers"), GITHUB_WATCHER_FACTOR),
        ]),
        SourceKind::News => {
            let comments = attr("comments");
            if comments > 0 {
                comments.saturating_mul(NEWS_COMMENT_FACTOR)
            } else {
                news_heuristic(&item.title, &item.content)
            }
        }
        SourceKind::Other => UNKNOWN_SOURCE_INTEREST,
    };

    raw.clamp(0, MAX_INTEREST)
}

/// Heuristic for articles without engagement counts.
///
/// base 100 + title-length bucket + 15 per distinct urgency keyword in the
/// title + one point per 100 content chars (max 20).
pub fn news_heuristic(title: &str, content: &str) -> i64 {
    let title_len = title.chars().count();
    let length_score = match title_len {
        20..=100 => 30,
        10..=19 | 101..=150 => 20,
        _ => 10,
    };

    let lowered = title.to_lowercase();
    let urgency = URGENCY_KEYWORDS
        .iter()
        .filter(|kw| lowered.contains(*kw))
        .count() as i64
        * NEWS_URGENCY_POINTS;

    let content_score = ((content.chars().count() / 100) as i64).min(NEWS_CONTENT_CAP);

    NEWS_BASE + length_score + urgency + content_score
}

fn weighted(parts: &[(i64, i64)]) -> i64 {
    parts
        .iter()
        .fold(0i64, |acc, (n, f)| acc.saturating_add(n.saturating_mul(*f)))
}

/// Read a count-like attribute. Missing, negative, or non-numeric values are 0;
/// numeric strings (e.g. "1200") are accepted, fractions are truncated.
fn attribute_count(v: Option<&Value>) -> i64 {
    let n = match v {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| u.min(i64::MAX as u64) as i64))
            .or_else(|| n.as_f64().map(f64_to_count)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(f64_to_count))
        }
        _ => None,
    };
    n.unwrap_or(0).max(0)
}

fn f64_to_count(f: f64) -> i64 {
    if f.is_finite() {
        // `as` saturates at the i64 bounds
        f.trunc() as i64
    } else {
        0
    }
}
