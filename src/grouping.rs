//! # Issue Grouper
//! Collapses free-text topic analyses into canonical issue groups.
//!
//! Grouping keys on the three longest salient tokens of the topic, so two
//! analyses whose titles differ but share long keywords merge into one issue.
//! The key is fuzzy and produces occasional false merges
//! ("Vaccine Mandate Lawsuit Won" and "Vaccine Mandate Lawsuit Lost" both key
//! to "vaccine mandate lawsuit") and false splits when a variant displaces
//! one of the three tokens ("chip" vs "chips"). Both are known imprecisions.
//!
//! Description fields are first-non-empty-wins in processing order: the
//! earliest analysis (in the order the store returned them, newest first)
//! that carries a `why_now` supplies the group's `why_now`, and likewise for
//! `what`, `context` and `summary`. Later analyses never overwrite them.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Sentiment, TopicAnalysis};

/// Tokens must be longer than this (in chars) to count as salient.
const MIN_TOKEN_CHARS: usize = 2;
/// Number of salient tokens that make up a canonical key.
const KEY_TOKENS: usize = 3;

const QUALITY_WHAT: f64 = 0.3;
const QUALITY_WHY_NOW: f64 = 0.5;
const QUALITY_CONTEXT: f64 = 0.2;

/// Lowercased, whitespace-split salient tokens of a topic (len > 2), in order.
pub fn salient_tokens(topic: &str) -> Vec<String> {
    topic
        .trim()
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Deterministic canonical key for a topic string.
///
/// Takes the three longest salient tokens (ties keep original order), longest
/// first, joined by a single space. Falls back to the trimmed lowercase topic,
/// then to `"unknown"`.
pub fn canonical_key(topic: &str) -> String {
    let mut tokens = salient_tokens(topic);
    if tokens.is_empty() {
        let normalized = topic.trim().to_lowercase();
        return if normalized.is_empty() {
            "unknown".to_string()
        } else {
            normalized
        };
    }
    // stable sort keeps original order between equal lengths
    tokens.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    tokens.truncate(KEY_TOKENS);
    tokens.join(" ")
}

/// Transient aggregate of all analyses sharing one canonical key.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueGroup {
    pub key: String,
    /// Topic of the first analysis assigned to this key.
    pub topic: String,
    pub importances: Vec<f64>,
    pub source_counts: Vec<i64>,
    pub sentiments: Vec<Sentiment>,
    pub supporting_item_ids: BTreeSet<i64>,
    pub what: String,
    pub why_now: String,
    pub context: String,
    pub summary: String,
    /// Running max of per-analysis field completeness, in [0, 1].
    pub content_quality: f64,
    /// 1.0 with any `why_now`, 0.5 with any `what`/`context`, else 0.
    pub temporal_relevance: f64,
}

impl IssueGroup {
    fn new(key: String, topic: &str) -> Self {
        Self {
            key,
            topic: topic.to_string(),
            importances: Vec::new(),
            source_counts: Vec::new(),
            sentiments: Vec::new(),
            supporting_item_ids: BTreeSet::new(),
            what: String::new(),
            why_now: String::new(),
            context: String::new(),
            summary: String::new(),
            content_quality: 0.0,
            temporal_relevance: 0.0,
        }
    }

    fn absorb(&mut self, a: &TopicAnalysis) {
        self.importances.push(a.importance);
        self.source_counts.push(a.source_count);
        self.sentiments.push(a.sentiment);
        self.supporting_item_ids
            .extend(a.supporting_item_ids.iter().copied());

        let (what, why_now, context) = (a.what(), a.why_now(), a.context());

        let mut quality = 0.0;
        if !what.is_empty() {
            quality += QUALITY_WHAT;
        }
        if !why_now.is_empty() {
            quality += QUALITY_WHY_NOW;
        }
        if !context.is_empty() {
            quality += QUALITY_CONTEXT;
        }
        self.content_quality = self.content_quality.max(quality);

        let relevance = if !why_now.is_empty() {
            1.0
        } else if !what.is_empty() || !context.is_empty() {
            0.5
        } else {
            0.0
        };
        self.temporal_relevance = self.temporal_relevance.max(relevance);

        fill_if_empty(&mut self.why_now, why_now);
        fill_if_empty(&mut self.what, what);
        fill_if_empty(&mut self.context, context);
        fill_if_empty(&mut self.summary, a.summary.trim());
    }

    /// Number of analyses merged into this group.
    pub fn analysis_count(&self) -> usize {
        self.importances.len()
    }

    /// Best description: `why_now`, else `what`, else `summary`.
    pub fn description(&self) -> &str {
        [&self.why_now, &self.what, &self.summary]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn fill_if_empty(slot: &mut String, candidate: &str) {
    if slot.is_empty() && !candidate.is_empty() {
        *slot = candidate.to_string();
    }
}

/// Group every analysis with `analyzed_at >= since`, in the given order.
pub fn group_analyses(
    analyses: &[TopicAnalysis],
    since: DateTime<Utc>,
) -> BTreeMap<String, IssueGroup> {
    let mut groups: BTreeMap<String, IssueGroup> = BTreeMap::new();
    for a in analyses.iter().filter(|a| a.analyzed_at >= since) {
        let key = canonical_key(&a.topic);
        groups
            .entry(key.clone())
            .or_insert_with(|| IssueGroup::new(key, a.topic.trim()))
            .absorb(a);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn analysis(topic: &str) -> TopicAnalysis {
        TopicAnalysis {
            topic: topic.into(),
            summary: String::new(),
            keywords: vec![],
            sentiment: Sentiment::Neutral,
            importance: 0.5,
            source_count: 1,
            supporting_item_ids: BTreeSet::new(),
            what: None,
            why_now: None,
            context: None,
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn key_takes_three_longest_tokens_longest_first() {
        assert_eq!(
            canonical_key("  AI Regulation Urgency Now "),
            "regulation urgency now"
        );
    }

    #[test]
    fn key_ties_keep_original_order() {
        // export(6) and widens(6) tie; export came first
        assert_eq!(canonical_key("Export Ban On Chips Widens"), "export widens chips");
    }

    #[test]
    fn key_is_a_function_of_the_longest_tokens_only() {
        let a = canonical_key("Regulation Urgency Debate Now");
        let b = canonical_key("now debate URGENCY regulation");
        assert_eq!(a, "regulation urgency debate");
        assert_eq!(a, b);
    }

    #[test]
    fn different_long_tokens_do_not_merge() {
        // "urgent" displaces "urgency": documented false split
        assert_ne!(
            canonical_key("AI Regulation Urgency Now"),
            canonical_key("Urgent AI Regulation Debate")
        );
    }

    #[test]
    fn short_tokens_never_separate_issues() {
        // documented false merge: only "won"/"lost" differ
        assert_eq!(
            canonical_key("Vaccine Mandate Lawsuit Won"),
            canonical_key("Vaccine Mandate Lawsuit Lost")
        );
    }

    #[test]
    fn key_fallbacks() {
        assert_eq!(canonical_key("AI is"), "ai is");
        assert_eq!(canonical_key("   "), "unknown");
        assert_eq!(canonical_key(""), "unknown");
    }

    #[test]
    fn description_fields_first_non_empty_wins() {
        let mut first = analysis("Grid Outage Spreads Widely");
        first.what = Some("first what".into());
        let mut second = analysis("grid outage spreads widely");
        second.what = Some("second what".into());
        second.why_now = Some("second why".into());
        second.context = Some("ctx".into());

        let groups = group_analyses(&[first, second], Utc::now() - Duration::hours(1));
        assert_eq!(groups.len(), 1);
        let g = groups.values().next().unwrap();
        assert_eq!(g.what, "first what");
        assert_eq!(g.why_now, "second why");
        assert_eq!(g.description(), "second why");
        assert_eq!(g.topic, "Grid Outage Spreads Widely");
        assert_eq!(g.analysis_count(), 2);
        assert!((g.content_quality - 1.0).abs() < 1e-9);
        assert!((g.temporal_relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn quality_is_running_max_and_relevance_never_downgrades() {
        let mut rich = analysis("Port Strike Continues");
        rich.why_now = Some("talks collapsed".into());
        let mut thin = analysis("Port Strike Continues");
        thin.what = Some("dock workers".into());

        let groups = group_analyses(&[rich, thin], Utc::now() - Duration::hours(1));
        let g = &groups["continues strike port"];
        assert!((g.content_quality - 0.5).abs() < 1e-9);
        assert!((g.temporal_relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn relevance_half_for_what_or_context_only() {
        let mut a = analysis("Quiet Topic Here");
        a.context = Some("background".into());
        let groups = group_analyses(&[a], Utc::now() - Duration::hours(1));
        let g = groups.values().next().unwrap();
        assert!((g.temporal_relevance - 0.5).abs() < 1e-9);
        assert!((g.content_quality - 0.2).abs() < 1e-9);
        assert_eq!(g.description(), "");
    }

    #[test]
    fn supporting_ids_are_unioned_and_window_filters() {
        let mut a = analysis("Rate Hike Signals");
        a.supporting_item_ids = [1, 2].into_iter().collect();
        let mut b = analysis("Rate Hike Signals");
        b.supporting_item_ids = [2, 3].into_iter().collect();
        let mut stale = analysis("Rate Hike Signals");
        stale.analyzed_at = Utc::now() - Duration::hours(3);
        stale.supporting_item_ids = [99].into_iter().collect();

        let groups = group_analyses(&[a, b, stale], Utc::now() - Duration::hours(1));
        let g = groups.values().next().unwrap();
        assert_eq!(g.supporting_item_ids, [1, 2, 3].into_iter().collect());
        assert_eq!(g.analysis_count(), 2);
    }
}
