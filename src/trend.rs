//! # Trend Direction
//! Classifies a ranked issue against its **nearest prior** snapshot that is
//! older than the recency cutoff. Surge detection uses a different, wider
//! baseline (see [`crate::surge`]).

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::model::TrendDirection;
use crate::store::RankingStore;

const UP_RATE: f64 = 50.0;
const DOWN_RATE: f64 = -30.0;
const RANK_SHIFT: i64 = 3;

/// Percent change from `previous` to `current`.
///
/// With `previous == 0` the rate is 100 when anything appeared, else 0.
pub fn change_rate(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        if current > 0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) as f64 / previous as f64 * 100.0
    }
}

/// `previous - current`; positive means the issue climbed.
pub fn rank_change(current_rank: u32, previous_rank: u32) -> i64 {
    i64::from(previous_rank) - i64::from(current_rank)
}

/// Pure classification. Up wins when both up and down criteria hold.
pub fn classify(rate: f64, rank_change: i64) -> TrendDirection {
    if rate >= UP_RATE || rank_change >= RANK_SHIFT {
        TrendDirection::Up
    } else if rate <= DOWN_RATE || rank_change <= -RANK_SHIFT {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    }
}

/// Direction of `topic` at `now` given its current interest and rank.
///
/// No prior snapshot, or a failed lookup, yields `Stable`.
pub async fn direction<S: RankingStore + ?Sized>(
    store: &S,
    topic: &str,
    current_interest: i64,
    current_rank: u32,
    now: DateTime<Utc>,
    cutoff: Duration,
) -> TrendDirection {
    let prior = match store.history_before(topic, now - cutoff, 1).await {
        Ok(rows) => rows.into_iter().next(),
        Err(e) => {
            let error = format!("{e:#}");
            warn!(target: "ranking", %topic, %error, "trend history lookup failed");
            None
        }
    };
    let Some(prev) = prior else {
        return TrendDirection::Stable;
    };
    classify(
        change_rate(current_interest, prev.interest_score),
        rank_change(current_rank, prev.rank),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueRanking, Sentiment};
    use crate::store::memory::InMemoryStore;
    use crate::store::PeriodWrite;

    fn row(topic: &str, rank: u32, interest: i64, end: DateTime<Utc>) -> IssueRanking {
        IssueRanking {
            topic: topic.into(),
            rank,
            score: 0.5,
            interest_score: interest,
            mention_count: 1,
            source_diversity: 1,
            sentiment: Sentiment::Neutral,
            trend_direction: TrendDirection::Stable,
            period_start: end - Duration::minutes(5),
            period_end: end,
            description: String::new(),
            what: String::new(),
            why_now: String::new(),
            context: String::new(),
        }
    }

    #[test]
    fn rate_handles_zero_baseline() {
        assert_eq!(change_rate(10, 0), 100.0);
        assert_eq!(change_rate(0, 0), 0.0);
        assert_eq!(change_rate(160, 100), 60.0);
        assert_eq!(change_rate(70, 100), -30.0);
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(60.0, 0), TrendDirection::Up);
        assert_eq!(classify(49.9, 2), TrendDirection::Stable);
        assert_eq!(classify(0.0, 3), TrendDirection::Up);
        assert_eq!(classify(-30.0, 0), TrendDirection::Down);
        assert_eq!(classify(10.0, -3), TrendDirection::Down);
        assert_eq!(classify(-29.0, -2), TrendDirection::Stable);
        // conflicting signals resolve to up
        assert_eq!(classify(-80.0, 4), TrendDirection::Up);
    }

    #[tokio::test]
    async fn no_prior_snapshot_is_stable() {
        let store = InMemoryStore::new();
        let d = direction(&store, "Grid Outage", 500, 1, Utc::now(), Duration::minutes(20)).await;
        assert_eq!(d, TrendDirection::Stable);
    }

    #[tokio::test]
    async fn compares_against_nearest_prior_outside_cutoff() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .replace_period(&PeriodWrite {
                rows: vec![
                    row("Grid Outage", 2, 10, now - Duration::minutes(40)),
                    row("Grid Outage", 2, 100, now - Duration::minutes(25)),
                    // inside the cutoff, ignored
                    row("Grid Outage", 1, 1000, now - Duration::minutes(5)),
                ],
                replace_from: now + Duration::days(1),
                prune_before: now - Duration::days(1),
            })
            .await
            .unwrap();
        let d = direction(&store, "Grid Outage", 160, 2, now, Duration::minutes(20)).await;
        assert_eq!(d, TrendDirection::Up);
        let d = direction(&store, "Grid Outage", 110, 2, now, Duration::minutes(20)).await;
        assert_eq!(d, TrendDirection::Stable);
    }
}
