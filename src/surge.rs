//! # Surge Detector
//! Flags currently ranked issues whose attention accelerated abnormally.
//!
//! The baseline is the **oldest** of up to three snapshots older than the
//! recency cutoff, a wider window than the nearest-prior comparison used by
//! [`crate::trend`]. The two are kept separate on purpose: one answers
//! "which way is it moving", the other "has it been climbing for a while".

use chrono::{DateTime, Duration, Utc};
use metrics::gauge;
use tracing::{debug, info, warn};

use crate::model::{IssueRanking, SurgeTrend};
use crate::store::RankingStore;
use crate::trend::{change_rate, rank_change};

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 10;
/// Prior snapshots fetched per topic; the oldest of them is the baseline.
pub const BASELINE_DEPTH: usize = 3;

const SURGE_MULTIPLIER: f64 = 2.0;
const SURGE_RANK_JUMP: i64 = 5;
const SURGE_RATE: f64 = 100.0;

/// `current / previous`; a zero baseline yields 2.0 when anything appeared, else 1.0.
pub fn interest_multiplier(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        if current > 0 {
            2.0
        } else {
            1.0
        }
    } else {
        current as f64 / previous as f64
    }
}

/// Pure evaluation of one topic against its baseline row.
pub fn evaluate(current: &IssueRanking, baseline: &IssueRanking) -> Option<SurgeTrend> {
    let multiplier = interest_multiplier(current.interest_score, baseline.interest_score);
    let rate = change_rate(current.interest_score, baseline.interest_score);
    let rank_delta = rank_change(current.rank, baseline.rank);

    let mut reasons = Vec::new();
    if multiplier >= SURGE_MULTIPLIER {
        reasons.push(format!("interest up {multiplier:.1}x"));
    }
    if rank_delta >= SURGE_RANK_JUMP {
        reasons.push(format!(
            "climbed {rank_delta} places (#{} -> #{})",
            baseline.rank, current.rank
        ));
    }
    if rate >= SURGE_RATE {
        reasons.push(format!("interest grew {rate:.0}%"));
    }
    if reasons.is_empty() {
        return None;
    }

    Some(SurgeTrend {
        topic: current.topic.clone(),
        current_rank: current.rank,
        previous_rank: baseline.rank,
        rank_change: rank_delta,
        current_interest: current.interest_score,
        previous_interest: baseline.interest_score,
        interest_change_rate: rate,
        interest_multiplier: multiplier,
        surge_reasons: reasons,
        description: current.description.clone(),
    })
}

/// Order by change rate (highest first) and keep `limit` (clamped to 1..=10).
pub fn select(mut surges: Vec<SurgeTrend>, limit: usize) -> Vec<SurgeTrend> {
    surges.sort_by(|a, b| {
        b.interest_change_rate
            .total_cmp(&a.interest_change_rate)
            .then_with(|| a.current_rank.cmp(&b.current_rank))
    });
    surges.truncate(limit.clamp(1, MAX_LIMIT));
    surges
}

/// Surges over the latest persisted snapshot.
///
/// Topics without history are skipped, as are topics whose history lookup
/// fails. A failure to read the snapshot itself is returned.
pub async fn detect<S: RankingStore + ?Sized>(
    store: &S,
    limit: usize,
    now: DateTime<Utc>,
    cutoff: Duration,
) -> anyhow::Result<Vec<SurgeTrend>> {
    let latest = store.latest_rankings().await?;

    let mut surges = Vec::new();
    for current in &latest {
        // history is relative to the snapshot, not the wall clock
        let before = current.period_end.min(now) - cutoff;
        let history = match store
            .history_before(&current.topic, before, BASELINE_DEPTH)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target: "surge", topic = %current.topic, %error, "history lookup failed; skipping topic");
                continue;
            }
        };
        // newest first, so the baseline is the last row
        let Some(baseline) = history.last() else {
            continue;
        };
        if let Some(s) = evaluate(current, baseline) {
            debug!(target: "surge", topic = %s.topic, rate = s.interest_change_rate, "surge flagged");
            surges.push(s);
        }
    }

    gauge!("pulse_surges_detected").set(surges.len() as f64);
    let out = select(surges, limit);
    info!(target: "surge", ranked = latest.len(), returned = out.len(), "surge detection done");
    Ok(out)
}
