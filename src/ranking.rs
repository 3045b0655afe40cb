//! # Composite Scorer / Ranker
//! Recomputes each issue group's current interest from freshly matched items,
//! blends the quality signals into a composite score, and selects the top
//! issues for the period.
//!
//! Ordering is by raw interest, highest first. The composite score travels
//! with each row as a secondary quality signal only.
//!
//! Lookup failures for one group are logged and count as zero evidence for
//! that group; they never abort the ranking.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::grouping::{salient_tokens, IssueGroup};
use crate::interest;
use crate::model::{RawItem, Sentiment};
use crate::store::ItemStore;

/// Maximum number of rows in one ranking snapshot.
pub const MAX_RANKED: usize = 10;
/// Supporting ids resolved per group (highest ids first).
pub const MAX_SUPPORTING_LOOKUP: usize = 200;
const TOP_SOURCE_TYPES: usize = 5;

const W_IMPORTANCE: f64 = 0.25;
const W_QUALITY: f64 = 0.25;
const W_TEMPORAL: f64 = 0.20;
const W_MENTIONS: f64 = 0.15;
const W_DIVERSITY: f64 = 0.10;
const W_DEPTH: f64 = 0.05;

const MENTION_SATURATION: f64 = 10.0;
const DIVERSITY_SATURATION: f64 = 5.0;

/// A scored issue ready to become a ranking row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedIssue {
    pub key: String,
    pub topic: String,
    pub description: String,
    pub what: String,
    pub why_now: String,
    pub context: String,
    pub score: f64,
    pub interest_score: i64,
    pub mention_count: i64,
    pub source_diversity: u32,
    pub max_sources: i64,
    pub sentiment: Sentiment,
    pub content_quality: f64,
    pub temporal_relevance: f64,
    pub top_source_types: Vec<(String, usize)>,
}

/// Evidence gathered for one group inside the interest window.
#[derive(Debug, Clone, Default)]
pub struct GroupEvidence {
    /// Deduplicated by id, supporting items first.
    pub items: Vec<RawItem>,
    /// Distinct source types of the supporting ids regardless of window;
    /// only consulted when `items` is empty.
    pub fallback_source_types: BTreeSet<String>,
    /// True when the keyword search ran and returned without error.
    pub keyword_search_ok: bool,
}

/// Keywords used to find independent mentions of a topic.
pub fn topic_keywords(topic: &str) -> Vec<String> {
    let tokens = salient_tokens(topic);
    if !tokens.is_empty() {
        return tokens;
    }
    let t = topic.trim().to_lowercase();
    if t.is_empty() {
        Vec::new()
    } else {
        vec![t]
    }
}

/// Mode of the collected sentiments.
///
/// Ties resolve to the lexicographically smallest label
/// ("negative" < "neutral" < "positive"); an empty list is neutral.
pub fn dominant_sentiment(sentiments: &[Sentiment]) -> Sentiment {
    let mut counts: BTreeMap<&'static str, (usize, Sentiment)> = BTreeMap::new();
    for s in sentiments {
        counts.entry(s.as_str()).or_insert((0, *s)).0 += 1;
    }
    // BTreeMap iterates labels ascending; keep the first label with the top count
    let mut best: Option<(usize, Sentiment)> = None;
    for (count, s) in counts.into_values() {
        if best.map_or(true, |(c, _)| count > c) {
            best = Some((count, s));
        }
    }
    best.map(|(_, s)| s).unwrap_or_default()
}

/// Composite score in [0, 1].
pub fn composite_score(
    avg_importance: f64,
    content_quality: f64,
    temporal_relevance: f64,
    mention_count: i64,
    source_diversity: u32,
    depth: f64,
) -> f64 {
    let mentions = (mention_count.max(0) as f64 / MENTION_SATURATION).min(1.0);
    let diversity = (f64::from(source_diversity) / DIVERSITY_SATURATION).min(1.0);
    W_IMPORTANCE * avg_importance
        + W_QUALITY * content_quality
        + W_TEMPORAL * temporal_relevance
        + W_MENTIONS * mentions
        + W_DIVERSITY * diversity
        + W_DEPTH * depth
}

/// `0.6·[why_now] + 0.4·[context]`.
pub fn depth_score(group: &IssueGroup) -> f64 {
    let mut depth = 0.0;
    if !group.why_now.is_empty() {
        depth += 0.6;
    }
    if !group.context.is_empty() {
        depth += 0.4;
    }
    depth
}

/// Pure scoring of one group from its gathered evidence.
pub fn score_group(group: &IssueGroup, evidence: &GroupEvidence) -> RankedIssue {
    let avg_importance = if group.importances.is_empty() {
        0.0
    } else {
        group.importances.iter().sum::<f64>() / group.importances.len() as f64
    };
    let max_sources = group.source_counts.iter().copied().max().unwrap_or(0);

    let (interest_score, mention_count, source_diversity, top_source_types) =
        if !evidence.items.is_empty() {
            let interest = evidence
                .items
                .iter()
                .fold(0i64, |acc, it| acc.saturating_add(interest::estimate(it)));
            let mut by_type: HashMap<&str, usize> = HashMap::new();
            for it in &evidence.items {
                *by_type.entry(it.source_type.as_str()).or_default() += 1;
            }
            let diversity = by_type.len() as u32;
            let mut top: Vec<(String, usize)> =
                by_type.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
            top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            top.truncate(TOP_SOURCE_TYPES);
            (interest, evidence.items.len() as i64, diversity, top)
        } else if !group.supporting_item_ids.is_empty() {
            (0, 0, evidence.fallback_source_types.len() as u32, Vec::new())
        } else if evidence.keyword_search_ok {
            // no item evidence at all: fall back to the analysis count
            let mentions = group.analysis_count() as i64;
            (mentions, mentions, 0, Vec::new())
        } else {
            (0, 0, 0, Vec::new())
        };

    let score = composite_score(
        avg_importance,
        group.content_quality,
        group.temporal_relevance,
        mention_count,
        source_diversity,
        depth_score(group),
    );

    RankedIssue {
        key: group.key.clone(),
        topic: group.topic.clone(),
        description: group.description().to_string(),
        what: group.what.clone(),
        why_now: group.why_now.clone(),
        context: group.context.clone(),
        score,
        interest_score,
        mention_count,
        source_diversity,
        max_sources,
        sentiment: dominant_sentiment(&group.sentiments),
        content_quality: group.content_quality,
        temporal_relevance: group.temporal_relevance,
        top_source_types,
    }
}

/// Gather in-window items for one group: supporting ids first, then keyword
/// matches, deduplicated by id. Each lookup fails independently.
pub async fn gather_evidence<S: ItemStore + ?Sized>(
    store: &S,
    group: &IssueGroup,
    now: DateTime<Utc>,
    interest_window: Duration,
) -> GroupEvidence {
    let since = now - interest_window;
    // ids grow with collection time, so the highest ones are the in-window ones
    let ids: Vec<i64> = group
        .supporting_item_ids
        .iter()
        .rev()
        .copied()
        .take(MAX_SUPPORTING_LOOKUP)
        .collect();

    let mut evidence = GroupEvidence::default();
    let mut seen: BTreeSet<i64> = BTreeSet::new();

    if !ids.is_empty() {
        match store.items_by_ids(&ids, Some(since)).await {
            Ok(items) => {
                for it in items {
                    if seen.insert(it.id) {
                        evidence.items.push(it);
                    }
                }
            }
            Err(e) => lookup_failed(&group.topic, "supporting ids", &e),
        }
    }

    let keywords = topic_keywords(&group.topic);
    if !keywords.is_empty() {
        match store.items_matching(&keywords, since).await {
            Ok(items) => {
                evidence.keyword_search_ok = true;
                let before = evidence.items.len();
                for it in items {
                    if seen.insert(it.id) {
                        evidence.items.push(it);
                    }
                }
                debug!(
                    target: "ranking",
                    topic = %group.topic,
                    extra = evidence.items.len() - before,
                    "keyword matches"
                );
            }
            Err(e) => lookup_failed(&group.topic, "keyword search", &e),
        }
    }

    if evidence.items.is_empty() && !ids.is_empty() {
        match store.items_by_ids(&ids, None).await {
            Ok(items) => {
                evidence.fallback_source_types =
                    items.into_iter().map(|it| it.source_type).collect();
            }
            Err(e) => lookup_failed(&group.topic, "source fallback", &e),
        }
    }

    evidence
}

fn lookup_failed(topic: &str, what: &str, err: &anyhow::Error) {
    counter!("pulse_lookup_errors_total").increment(1);
    let error = format!("{err:#}");
    warn!(target: "ranking", %topic, lookup = what, %error, "lookup failed; counting as zero");
}

/// Sort by interest (desc), then composite score (desc), then topic, and keep `top_n`.
pub fn select_top(mut issues: Vec<RankedIssue>, top_n: usize) -> Vec<RankedIssue> {
    issues.sort_by(|a, b| {
        b.interest_score
            .cmp(&a.interest_score)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.topic.cmp(&b.topic))
    });
    issues.truncate(top_n.clamp(1, MAX_RANKED));
    issues
}

/// Score every group against the store and return the top issues.
pub async fn rank_groups<S: ItemStore + ?Sized>(
    store: &S,
    groups: &BTreeMap<String, IssueGroup>,
    now: DateTime<Utc>,
    interest_window: Duration,
    top_n: usize,
) -> Vec<RankedIssue> {
    let mut scored = Vec::with_capacity(groups.len());
    for group in groups.values() {
        let evidence = gather_evidence(store, group, now, interest_window).await;
        let issue = score_group(group, &evidence);
        debug!(
            target: "ranking",
            topic = %issue.topic,
            interest = issue.interest_score,
            mentions = issue.mention_count,
            score = issue.score,
            "scored group"
        );
        scored.push(issue);
    }

    let total = scored.len();
    let top = select_top(scored, top_n);
    info!(target: "ranking", groups = total, selected = top.len(), "ranking computed");
    top
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::group_analyses;
    use crate::model::TopicAnalysis;

    fn group(topic: &str) -> IssueGroup {
        let a = TopicAnalysis {
            topic: topic.into(),
            summary: "summary".into(),
            keywords: vec![],
            sentiment: Sentiment::Neutral,
            importance: 0.8,
            source_count: 4,
            supporting_item_ids: BTreeSet::new(),
            what: Some("what".into()),
            why_now: Some("why".into()),
            context: Some("ctx".into()),
            analyzed_at: Utc::now(),
        };
        group_analyses(&[a], Utc::now() - Duration::hours(1))
            .into_values()
            .next()
            .unwrap()
    }

    fn item(id: i64, source_type: &str, views: i64) -> RawItem {
        let mut attributes = HashMap::new();
        attributes.insert("views".to_string(), serde_json::json!(views));
        RawItem {
            id,
            source_type: source_type.into(),
            title: String::new(),
            content: String::new(),
            url: String::new(),
            attributes,
            collected_at: Utc::now(),
        }
    }

    fn issue(topic: &str, interest: i64, score: f64) -> RankedIssue {
        let mut r = score_group(&group(topic), &GroupEvidence::default());
        r.interest_score = interest;
        r.score = score;
        r
    }

    #[test]
    fn sentiment_mode_and_tie_break() {
        use Sentiment::*;
        assert_eq!(dominant_sentiment(&[Positive, Positive, Negative]), Positive);
        assert_eq!(dominant_sentiment(&[Positive, Negative]), Negative);
        assert_eq!(dominant_sentiment(&[Positive, Neutral]), Neutral);
        assert_eq!(dominant_sentiment(&[Neutral, Positive, Negative]), Negative);
        assert_eq!(dominant_sentiment(&[]), Neutral);
    }

    #[test]
    fn tie_break_does_not_depend_on_input_order() {
        use Sentiment::*;
        let a = dominant_sentiment(&[Positive, Neutral, Neutral, Positive]);
        let b = dominant_sentiment(&[Neutral, Positive, Positive, Neutral]);
        assert_eq!(a, b);
        assert_eq!(a, Neutral);
    }

    #[test]
    fn composite_weights_saturate() {
        let full = composite_score(1.0, 1.0, 1.0, 50, 9, 1.0);
        assert!((full - 1.0).abs() < 1e-9);
        let partial = composite_score(0.5, 0.0, 0.0, 5, 1, 0.0);
        let expected = 0.25 * 0.5 + 0.15 * 0.5 + 0.10 * 0.2;
        assert!((partial - expected).abs() < 1e-9);
    }

    #[test]
    fn interest_sums_estimates_and_counts_distinct_sources() {
        let g = group("Solar Storm Warning");
        let evidence = GroupEvidence {
            items: vec![item(1, "youtube", 1000), item(2, "youtube", 500), item(3, "news", 0)],
            fallback_source_types: BTreeSet::new(),
            keyword_search_ok: true,
        };
        let r = score_group(&g, &evidence);
        // news item with empty title/content: 100 + 10 + 0 + 0
        assert_eq!(r.interest_score, 1000 + 500 + 110);
        assert_eq!(r.mention_count, 3);
        assert_eq!(r.source_diversity, 2);
        assert_eq!(r.top_source_types[0], ("youtube".to_string(), 2));
        assert_eq!(r.max_sources, 4);
        assert_eq!(r.description, "why");
        // 0.25*0.8 + 0.25*1 + 0.2*1 + 0.15*0.3 + 0.1*0.4 + 0.05*1
        assert!((r.score - 0.785).abs() < 1e-9);
    }

    #[test]
    fn no_evidence_and_no_ids_falls_back_to_analysis_count() {
        let g = group("Solar Storm Warning");
        let evidence = GroupEvidence {
            keyword_search_ok: true,
            ..Default::default()
        };
        let r = score_group(&g, &evidence);
        assert_eq!(r.interest_score, 1);
        assert_eq!(r.mention_count, 1);
    }

    #[test]
    fn failed_lookup_contributes_zero() {
        let g = group("Solar Storm Warning");
        let r = score_group(&g, &GroupEvidence::default());
        assert_eq!(r.interest_score, 0);
        assert_eq!(r.mention_count, 0);
    }

    #[test]
    fn supporting_ids_without_window_hits_use_source_fallback() {
        let mut g = group("Solar Storm Warning");
        g.supporting_item_ids = [1, 2].into_iter().collect();
        let evidence = GroupEvidence {
            items: vec![],
            fallback_source_types: ["news".to_string(), "reddit".to_string()].into_iter().collect(),
            keyword_search_ok: true,
        };
        let r = score_group(&g, &evidence);
        assert_eq!(r.interest_score, 0);
        assert_eq!(r.source_diversity, 2);
    }

    #[tokio::test]
    async fn supporting_id_cap_keeps_the_newest_items() {
        use crate::store::memory::InMemoryStore;

        let now = Utc::now();
        let store = InMemoryStore::new();
        let items: Vec<RawItem> = (1..=250)
            .map(|id| {
                let mut it = item(id, "youtube", 1000);
                it.title = format!("clip {id}");
                it.collected_at = if id <= 200 {
                    now - Duration::hours(1)
                } else {
                    now - Duration::minutes(1)
                };
                it
            })
            .collect();
        store.insert_items(&items).await.unwrap();

        let mut g = group("Solar Storm Warning");
        g.supporting_item_ids = (1..=250).collect();
        let evidence = gather_evidence(&store, &g, now, Duration::minutes(5)).await;
        let r = score_group(&g, &evidence);
        assert_eq!(r.mention_count, 50);
        assert_eq!(r.interest_score, 50 * 1000);
    }

    #[test]
    fn select_top_orders_by_interest_not_score() {
        let issues = vec![
            issue("low interest high score", 10, 0.99),
            issue("high interest low score", 1000, 0.10),
            issue("mid", 500, 0.50),
        ];
        let top = select_top(issues, 10);
        let order: Vec<i64> = top.iter().map(|r| r.interest_score).collect();
        assert_eq!(order, vec![1000, 500, 10]);
    }

    #[test]
    fn select_top_caps_at_ten() {
        let issues = (0..15).map(|i| issue(&format!("topic {i}"), i, 0.5)).collect();
        let top = select_top(issues, 25);
        assert_eq!(top.len(), 10);
        assert!(top.windows(2).all(|w| w[0].interest_score >= w[1].interest_score));
        assert_eq!(top[0].interest_score, 14);
    }

    #[test]
    fn keywords_fall_back_to_whole_topic() {
        assert_eq!(topic_keywords("AI"), vec!["ai".to_string()]);
        assert_eq!(topic_keywords("New GPU Launch"), vec!["new", "gpu", "launch"]);
        assert!(topic_keywords("  ").is_empty());
    }
}
