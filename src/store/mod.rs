//! Storage abstraction for the ranking engine.
//!
//! Three narrow traits cover what the engine consumes and produces:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ItemStore`] | raw items by id set, by keyword, by source + time range |
//! | [`AnalysisStore`] | analyzer output by time range |
//! | [`RankingStore`] | transactional period replacement + snapshot/history reads |
//!
//! [`PulseStore`] bundles all three for the engine and the HTTP layer.
//! Implementations must be `Send + Sync`.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};

use crate::model::{IssueRanking, RawItem, TopicAnalysis};

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert items; ids already present are skipped. Returns the number inserted.
    async fn insert_items(&self, items: &[RawItem]) -> Result<usize>;

    /// Items whose id is in `ids`, optionally restricted to `collected_at >= since`.
    async fn items_by_ids(&self, ids: &[i64], since: Option<DateTime<Utc>>)
        -> Result<Vec<RawItem>>;

    /// Items collected at or after `since` whose title or content contains any
    /// of `keywords` (Unicode case-insensitive substring, see [`keyword_matcher`]).
    async fn items_matching(&self, keywords: &[String], since: DateTime<Utc>)
        -> Result<Vec<RawItem>>;

    /// Items in `[since, until)`, optionally filtered by source type, oldest first.
    async fn items_between(
        &self,
        source_type: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RawItem>>;
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn insert_analyses(&self, analyses: &[TopicAnalysis]) -> Result<usize>;

    /// Analyses with `analyzed_at >= since`, newest first.
    async fn analyses_since(&self, since: DateTime<Utc>) -> Result<Vec<TopicAnalysis>>;

    /// Delete analyses with `analyzed_at < before`. Returns the number removed.
    async fn prune_analyses(&self, before: DateTime<Utc>) -> Result<usize>;
}

/// One cycle's replacement write.
#[derive(Debug, Clone)]
pub struct PeriodWrite {
    /// New rows, rank 1..=10.
    pub rows: Vec<IssueRanking>,
    /// Existing rows with `period_start >= replace_from` are deleted.
    pub replace_from: DateTime<Utc>,
    /// Existing rows with `period_end < prune_before` are deleted.
    pub prune_before: DateTime<Utc>,
}

#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Delete-then-insert in one transaction. On error nothing changes.
    async fn replace_period(&self, write: &PeriodWrite) -> Result<usize>;

    /// Rows of the most recent `period_start`, ordered by rank.
    async fn latest_rankings(&self) -> Result<Vec<IssueRanking>>;

    /// Rows for `topic` with `period_end < before`, most recent first.
    async fn history_before(
        &self,
        topic: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<IssueRanking>>;

    /// Most recent rows for `topic`, newest first.
    async fn topic_history(&self, topic: &str, limit: usize) -> Result<Vec<IssueRanking>>;
}

/// Everything the engine and API need from persistence.
pub trait PulseStore: ItemStore + AnalysisStore + RankingStore {}

impl<T: ItemStore + AnalysisStore + RankingStore + ?Sized> PulseStore for T {}

/// One Unicode case-insensitive alternation over all keywords, shared by
/// every backend so keyword matches agree across stores.
pub(crate) fn keyword_matcher(keywords: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let re = RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()?;
    Ok(Some(re))
}
