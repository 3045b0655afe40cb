//! # Data Model
//! Inputs the engine reads (raw items, topic analyses) and the outputs it
//! produces (persisted ranking rows, transient surge flags).
//!
//! JSON field names are camelCase; this is the contract the HTTP and
//! persistence layers honor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// One collected content item (post, repository, video, article).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub id: i64,
    /// "news" | "reddit" | "github" | "youtube" | anything else.
    pub source_type: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    /// Source-specific engagement metadata (views, upvotes, stars, ...).
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    /// Lenient parse; unknown labels fall back to neutral.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured output of the upstream analyzer for one topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicAnalysis {
    pub topic: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    /// In [0, 1].
    #[serde(default)]
    pub importance: f64,
    #[serde(default)]
    pub source_count: i64,
    #[serde(default)]
    pub supporting_item_ids: BTreeSet<i64>,
    #[serde(default)]
    pub what: Option<String>,
    #[serde(default)]
    pub why_now: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl TopicAnalysis {
    pub fn what(&self) -> &str {
        non_empty(&self.what)
    }

    pub fn why_now(&self) -> &str {
        non_empty(&self.why_now)
    }

    pub fn context(&self) -> &str {
        non_empty(&self.context)
    }
}

fn non_empty(field: &Option<String>) -> &str {
    field.as_deref().map(str::trim).unwrap_or("")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => TrendDirection::Up,
            "down" => TrendDirection::Down,
            _ => TrendDirection::Stable,
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted row of a ranking snapshot (one issue, one cycle).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueRanking {
    pub topic: String,
    /// 1..=10, 1 = highest interest.
    pub rank: u32,
    /// Composite quality score; secondary signal, not the sort key.
    pub score: f64,
    pub interest_score: i64,
    pub mention_count: i64,
    pub source_diversity: u32,
    pub sentiment: Sentiment,
    pub trend_direction: TrendDirection,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub description: String,
    pub what: String,
    pub why_now: String,
    pub context: String,
}

/// An issue flagged as abnormally fast-rising against its older baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurgeTrend {
    pub topic: String,
    pub current_rank: u32,
    pub previous_rank: u32,
    /// previous - current; positive means the issue climbed.
    pub rank_change: i64,
    pub current_interest: i64,
    pub previous_interest: i64,
    pub interest_change_rate: f64,
    pub interest_multiplier: f64,
    pub surge_reasons: Vec<String>,
    pub description: String,
}
