//! One ranking cycle, end to end.
//!
//! `analyze (optional) -> group -> score -> trend -> replace period`.
//!
//! At most one cycle runs at a time per [`Engine`]: a second caller while a
//! cycle is in flight gets [`CycleOutcome::SkippedBusy`] immediately instead
//! of queueing behind it.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::analyzer::DynAnalyzer;
use crate::grouping::group_analyses;
use crate::model::{IssueRanking, SurgeTrend, TrendDirection};
use crate::ranking::{self, RankedIssue};
use crate::store::{PeriodWrite, PulseStore};
use crate::{surge, trend};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cycle period; also the width of one ranking period.
    pub interval: Duration,
    /// How far back analyses (and analyzer input items) are read.
    pub analysis_lookback: Duration,
    /// Trailing window for current-interest matching.
    pub interest_window: Duration,
    /// History newer than this is ignored by trend and surge baselines.
    pub history_cutoff: Duration,
    /// Rows whose period ended longer ago than this are pruned.
    pub retention: Duration,
    pub top_n: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::minutes(5),
            analysis_lookback: Duration::hours(1),
            interest_window: Duration::minutes(5),
            history_cutoff: Duration::minutes(20),
            retention: Duration::hours(24),
            top_n: ranking::MAX_RANKED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AnalyzerUnavailable,
    NoAnalyses,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AnalyzerUnavailable => "analyzer_unavailable",
            SkipReason::NoAnalyses => "no_analyses",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New snapshot written.
    Completed { rows: usize },
    /// Nothing to rank; previous rows stay authoritative.
    Skipped(SkipReason),
    /// Another cycle held the guard.
    SkippedBusy,
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Completed { .. } => "completed",
            CycleOutcome::Skipped(_) => "skipped",
            CycleOutcome::SkippedBusy => "busy",
        }
    }
}

pub struct Engine {
    store: Arc<dyn PulseStore>,
    analyzer: Option<DynAnalyzer>,
    cfg: EngineConfig,
    in_flight: Mutex<()>,
}

impl Engine {
    pub fn new(store: Arc<dyn PulseStore>, cfg: EngineConfig) -> Self {
        Self {
            store,
            analyzer: None,
            cfg,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_analyzer(mut self, analyzer: DynAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn store(&self) -> &Arc<dyn PulseStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// True while a cycle holds the single-flight guard.
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Run one cycle as of `now`, or return `SkippedBusy` if one is running.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            counter!("pulse_cycles_total", "outcome" => "busy").increment(1);
            info!(target: "cycle", "previous cycle still running; skipping");
            return Ok(CycleOutcome::SkippedBusy);
        };

        let started = Instant::now();
        let result = self.run_locked(now).await;
        histogram!("pulse_cycle_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(outcome) => {
                counter!("pulse_cycles_total", "outcome" => outcome.label()).increment(1);
            }
            Err(e) => {
                counter!("pulse_cycles_total", "outcome" => "failed").increment(1);
                counter!("pulse_cycle_failures_total").increment(1);
                let error = format!("{e:#}");
                warn!(target: "cycle", %error, "cycle failed; previous snapshot kept");
            }
        }
        result
    }

    async fn run_locked(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let store = self.store.as_ref();
        let since = now - self.cfg.analysis_lookback;

        if let Some(analyzer) = &self.analyzer {
            if let Some(reason) = self.feed_analyzer(analyzer, since, now).await? {
                return Ok(CycleOutcome::Skipped(reason));
            }
        }

        let analyses = store
            .analyses_since(since)
            .await
            .context("load topic analyses")?;
        if analyses.is_empty() {
            info!(target: "cycle", "no analyses in look-back window; skipping");
            return Ok(CycleOutcome::Skipped(SkipReason::NoAnalyses));
        }

        let groups = group_analyses(&analyses, since);
        let ranked = ranking::rank_groups(
            store,
            &groups,
            now,
            self.cfg.interest_window,
            self.cfg.top_n,
        )
        .await;

        let period_start = now - self.cfg.interval;
        let mut rows = Vec::with_capacity(ranked.len());
        for (i, issue) in ranked.iter().enumerate() {
            let rank = (i + 1) as u32;
            let direction = trend::direction(
                store,
                &issue.topic,
                issue.interest_score,
                rank,
                now,
                self.cfg.history_cutoff,
            )
            .await;
            rows.push(to_row(issue, rank, direction, period_start, now));
        }

        let write = PeriodWrite {
            rows,
            replace_from: period_start,
            prune_before: now - self.cfg.retention,
        };
        let written = store
            .replace_period(&write)
            .await
            .context("replace ranking period")?;

        // analyses still inside the look-back window are always kept
        let expire_before = (now - self.cfg.retention).min(since);
        match store.prune_analyses(expire_before).await {
            Ok(0) => {}
            Ok(pruned) => debug!(target: "cycle", pruned, "expired analyses pruned"),
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target: "cycle", %error, "pruning analyses failed");
            }
        }

        gauge!("pulse_ranked_issues").set(written as f64);
        gauge!("pulse_last_cycle_ts").set(now.timestamp() as f64);
        info!(
            target: "cycle",
            analyses = analyses.len(),
            groups = groups.len(),
            rows = written,
            "ranking cycle completed"
        );
        Ok(CycleOutcome::Completed { rows: written })
    }

    /// Returns a skip reason when the analyzer cannot supply anything.
    async fn feed_analyzer(
        &self,
        analyzer: &DynAnalyzer,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<SkipReason>> {
        let store = self.store.as_ref();
        let items = store
            .items_between(None, since, now)
            .await
            .context("load analyzer input")?;

        match analyzer.analyze(&items).await {
            Ok(analyses) if analyses.is_empty() => {
                info!(target: "cycle", analyzer = analyzer.name(), "analyzer returned nothing; skipping");
                Ok(Some(SkipReason::NoAnalyses))
            }
            Ok(analyses) => {
                store
                    .insert_analyses(&analyses)
                    .await
                    .context("store topic analyses")?;
                Ok(None)
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target: "cycle", analyzer = analyzer.name(), %error, "analyzer unavailable; skipping");
                Ok(Some(SkipReason::AnalyzerUnavailable))
            }
        }
    }

    /// Surges over the latest snapshot as of `now`.
    pub async fn detect_surges(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<SurgeTrend>> {
        surge::detect(self.store.as_ref(), limit, now, self.cfg.history_cutoff).await
    }
}

fn to_row(
    issue: &RankedIssue,
    rank: u32,
    trend_direction: TrendDirection,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> IssueRanking {
    IssueRanking {
        topic: issue.topic.clone(),
        rank,
        score: issue.score,
        interest_score: issue.interest_score,
        mention_count: issue.mention_count,
        source_diversity: issue.source_diversity,
        sentiment: issue.sentiment,
        trend_direction,
        period_start,
        period_end,
        description: issue.description.clone(),
        what: issue.what.clone(),
        why_now: issue.why_now.clone(),
        context: issue.context.clone(),
    }
}
