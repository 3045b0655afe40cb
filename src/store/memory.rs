//! In-memory [`PulseStore`] for tests and single-process runs.
//!
//! Raw items are capacity-bounded (oldest evicted first). Ranking replacement
//! builds the next row set off to the side and swaps it in under one write
//! lock, so readers never observe a partial cycle.

use std::collections::{HashSet, VecDeque};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{IssueRanking, RawItem, TopicAnalysis};

use super::{keyword_matcher, AnalysisStore, ItemStore, PeriodWrite, RankingStore};

const DEFAULT_MAX_ITEMS: usize = 50_000;

pub struct InMemoryStore {
    items: RwLock<VecDeque<RawItem>>,
    analyses: RwLock<Vec<TopicAnalysis>>,
    rankings: RwLock<Vec<IssueRanking>>,
    max_items: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ITEMS)
    }

    /// Store that keeps at most `max_items` raw items.
    pub fn with_capacity(max_items: usize) -> Self {
        Self {
            items: RwLock::new(VecDeque::new()),
            analyses: RwLock::new(Vec::new()),
            rankings: RwLock::new(Vec::new()),
            max_items: max_items.max(1),
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.read().map(|v| v.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn insert_items(&self, items: &[RawItem]) -> Result<usize> {
        let mut store = self.items.write().map_err(poisoned)?;
        let mut seen: HashSet<i64> = store.iter().map(|i| i.id).collect();
        let mut inserted = 0usize;
        for it in items {
            if seen.insert(it.id) {
                store.push_back(it.clone());
                inserted += 1;
            }
        }
        while store.len() > self.max_items {
            store.pop_front();
        }
        Ok(inserted)
    }

    async fn items_by_ids(
        &self,
        ids: &[i64],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawItem>> {
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        let store = self.items.read().map_err(poisoned)?;
        Ok(store
            .iter()
            .filter(|i| wanted.contains(&i.id))
            .filter(|i| since.map_or(true, |s| i.collected_at >= s))
            .cloned()
            .collect())
    }

    async fn items_matching(
        &self,
        keywords: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<RawItem>> {
        let Some(re) = keyword_matcher(keywords)? else {
            return Ok(Vec::new());
        };
        let store = self.items.read().map_err(poisoned)?;
        Ok(store
            .iter()
            .filter(|i| i.collected_at >= since)
            .filter(|i| re.is_match(&i.title) || re.is_match(&i.content))
            .cloned()
            .collect())
    }

    async fn items_between(
        &self,
        source_type: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RawItem>> {
        let store = self.items.read().map_err(poisoned)?;
        let mut out: Vec<RawItem> = store
            .iter()
            .filter(|i| i.collected_at >= since && i.collected_at < until)
            .filter(|i| source_type.map_or(true, |s| i.source_type.eq_ignore_ascii_case(s)))
            .cloned()
            .collect();
        out.sort_by_key(|i| i.collected_at);
        Ok(out)
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn insert_analyses(&self, analyses: &[TopicAnalysis]) -> Result<usize> {
        let mut store = self.analyses.write().map_err(poisoned)?;
        store.extend_from_slice(analyses);
        Ok(analyses.len())
    }

    async fn analyses_since(&self, since: DateTime<Utc>) -> Result<Vec<TopicAnalysis>> {
        let store = self.analyses.read().map_err(poisoned)?;
        let mut out: Vec<TopicAnalysis> = store
            .iter()
            .filter(|a| a.analyzed_at >= since)
            .cloned()
            .collect();
        // newest first; stable for equal timestamps
        out.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        Ok(out)
    }

    async fn prune_analyses(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut store = self.analyses.write().map_err(poisoned)?;
        let len = store.len();
        store.retain(|a| a.analyzed_at >= before);
        Ok(len - store.len())
    }
}

#[async_trait]
impl RankingStore for InMemoryStore {
    async fn replace_period(&self, write: &PeriodWrite) -> Result<usize> {
        if let Some(bad) = write.rows.iter().find(|r| !(1..=10).contains(&r.rank)) {
            return Err(anyhow!("rank {} out of range for '{}'", bad.rank, bad.topic));
        }
        let mut rows = self.rankings.write().map_err(poisoned)?;
        let mut next: Vec<IssueRanking> = rows
            .iter()
            .filter(|r| r.period_start < write.replace_from)
            .filter(|r| r.period_end >= write.prune_before)
            .cloned()
            .collect();
        next.extend(write.rows.iter().cloned());
        *rows = next;
        Ok(write.rows.len())
    }

    async fn latest_rankings(&self) -> Result<Vec<IssueRanking>> {
        let rows = self.rankings.read().map_err(poisoned)?;
        let Some(latest) = rows.iter().map(|r| r.period_start).max() else {
            return Ok(Vec::new());
        };
        let mut out: Vec<IssueRanking> = rows
            .iter()
            .filter(|r| r.period_start == latest)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.rank);
        Ok(out)
    }

    async fn history_before(
        &self,
        topic: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<IssueRanking>> {
        let rows = self.rankings.read().map_err(poisoned)?;
        let mut out: Vec<IssueRanking> = rows
            .iter()
            .filter(|r| r.topic == topic && r.period_end < before)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.period_end.cmp(&a.period_end));
        out.truncate(limit);
        Ok(out)
    }

    async fn topic_history(&self, topic: &str, limit: usize) -> Result<Vec<IssueRanking>> {
        let rows = self.rankings.read().map_err(poisoned)?;
        let mut out: Vec<IssueRanking> = rows.iter().filter(|r| r.topic == topic).cloned().collect();
        out.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        out.truncate(limit);
        Ok(out)
    }
}
