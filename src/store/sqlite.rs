//! SQLite-backed [`PulseStore`] (sqlx, WAL journal).
//!
//! Timestamps are stored as UTC milliseconds. Ranking replacement runs in one
//! transaction; any error drops the transaction, which rolls it back and
//! leaves the previous cycle's rows in place.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::model::{IssueRanking, RawItem, Sentiment, TopicAnalysis, TrendDirection};

use super::{keyword_matcher, AnalysisStore, ItemStore, PeriodWrite, RankingStore};

/// Upper bound on bound parameters per `IN (...)` lookup.
const MAX_ID_BATCH: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
    max_items: usize,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &Path, max_items: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening sqlite db at {}", path.display()))?;

        let store = Self {
            pool,
            max_items: max_items.max(1),
        };
        store.migrate().await?;
        info!(target: "store", path = %path.display(), "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw_items (
                id INTEGER PRIMARY KEY,
                source_type TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                attributes_json TEXT NOT NULL DEFAULT '{}',
                collected_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topic_analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                keywords_json TEXT NOT NULL DEFAULT '[]',
                sentiment TEXT NOT NULL DEFAULT 'neutral',
                importance REAL NOT NULL DEFAULT 0,
                source_count INTEGER NOT NULL DEFAULT 0,
                supporting_ids_json TEXT NOT NULL DEFAULT '[]',
                what TEXT,
                why_now TEXT,
                context TEXT,
                analyzed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS issue_rankings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                rank INTEGER NOT NULL CHECK (rank BETWEEN 1 AND 10),
                score REAL NOT NULL,
                interest_score INTEGER NOT NULL DEFAULT 0,
                mention_count INTEGER NOT NULL DEFAULT 0,
                source_diversity INTEGER NOT NULL DEFAULT 0,
                sentiment TEXT NOT NULL DEFAULT 'neutral',
                trend_direction TEXT NOT NULL DEFAULT 'stable',
                period_start INTEGER NOT NULL,
                period_end INTEGER NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                what TEXT NOT NULL DEFAULT '',
                why_now TEXT NOT NULL DEFAULT '',
                context TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_raw_items_collected_at ON raw_items(collected_at)",
            "CREATE INDEX IF NOT EXISTS idx_raw_items_source_type ON raw_items(source_type)",
            "CREATE INDEX IF NOT EXISTS idx_analyses_analyzed_at ON topic_analyses(analyzed_at)",
            "CREATE INDEX IF NOT EXISTS idx_rankings_period_start ON issue_rankings(period_start)",
            "CREATE INDEX IF NOT EXISTS idx_rankings_topic ON issue_rankings(topic, period_end)",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn item_from_row(row: &SqliteRow) -> Result<RawItem> {
    let attributes_json: String = row.try_get("attributes_json")?;
    Ok(RawItem {
        id: row.try_get("id")?,
        source_type: row.try_get("source_type")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        url: row.try_get("url")?,
        attributes: serde_json::from_str(&attributes_json).unwrap_or_default(),
        collected_at: from_millis(row.try_get("collected_at")?),
    })
}

fn analysis_from_row(row: &SqliteRow) -> Result<TopicAnalysis> {
    let keywords_json: String = row.try_get("keywords_json")?;
    let ids_json: String = row.try_get("supporting_ids_json")?;
    let sentiment: String = row.try_get("sentiment")?;
    Ok(TopicAnalysis {
        topic: row.try_get("topic")?,
        summary: row.try_get("summary")?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        sentiment: Sentiment::parse(&sentiment),
        importance: row.try_get("importance")?,
        source_count: row.try_get("source_count")?,
        supporting_item_ids: serde_json::from_str(&ids_json).unwrap_or_default(),
        what: row.try_get("what")?,
        why_now: row.try_get("why_now")?,
        context: row.try_get("context")?,
        analyzed_at: from_millis(row.try_get("analyzed_at")?),
    })
}

fn ranking_from_row(row: &SqliteRow) -> Result<IssueRanking> {
    let rank: i64 = row.try_get("rank")?;
    let diversity: i64 = row.try_get("source_diversity")?;
    let sentiment: String = row.try_get("sentiment")?;
    let direction: String = row.try_get("trend_direction")?;
    Ok(IssueRanking {
        topic: row.try_get("topic")?,
        rank: u32::try_from(rank).unwrap_or(u32::MAX),
        score: row.try_get("score")?,
        interest_score: row.try_get("interest_score")?,
        mention_count: row.try_get("mention_count")?,
        source_diversity: u32::try_from(diversity).unwrap_or(0),
        sentiment: Sentiment::parse(&sentiment),
        trend_direction: TrendDirection::parse(&direction),
        period_start: from_millis(row.try_get("period_start")?),
        period_end: from_millis(row.try_get("period_end")?),
        description: row.try_get("description")?,
        what: row.try_get("what")?,
        why_now: row.try_get("why_now")?,
        context: row.try_get("context")?,
    })
}

const RANKING_COLUMNS: &str = "topic, rank, score, interest_score, mention_count, \
    source_diversity, sentiment, trend_direction, period_start, period_end, \
    description, what, why_now, context";

#[async_trait]
impl ItemStore for SqliteStore {
    async fn insert_items(&self, items: &[RawItem]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for it in items {
            let attributes_json = serde_json::to_string(&it.attributes)?;
            let res = sqlx::query(
                "INSERT OR IGNORE INTO raw_items \
                 (id, source_type, title, content, url, attributes_json, collected_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(it.id)
            .bind(&it.source_type)
            .bind(&it.title)
            .bind(&it.content)
            .bind(&it.url)
            .bind(&attributes_json)
            .bind(to_millis(it.collected_at))
            .execute(&mut *tx)
            .await?;
            inserted += res.rows_affected() as usize;
        }

        // capacity bound: drop the oldest rows beyond max_items
        sqlx::query(
            "DELETE FROM raw_items WHERE id IN ( \
               SELECT id FROM raw_items ORDER BY collected_at DESC, id DESC LIMIT -1 OFFSET ?)",
        )
        .bind(self.max_items as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn items_by_ids(
        &self,
        ids: &[i64],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawItem>> {
        let mut out = Vec::new();
        for chunk in ids.chunks(MAX_ID_BATCH) {
            let sql = format!(
                "SELECT * FROM raw_items WHERE id IN ({}) AND collected_at >= ? ORDER BY id",
                placeholders(chunk.len())
            );
            let mut q = sqlx::query(&sql);
            for id in chunk {
                q = q.bind(*id);
            }
            let rows = q
                .bind(since.map(to_millis).unwrap_or(i64::MIN))
                .fetch_all(&self.pool)
                .await?;
            for row in &rows {
                out.push(item_from_row(row)?);
            }
        }
        Ok(out)
    }

    async fn items_matching(
        &self,
        keywords: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<RawItem>> {
        let Some(re) = keyword_matcher(keywords)? else {
            return Ok(Vec::new());
        };
        // LIKE folds ASCII only; the shared matcher folds full Unicode
        let rows = sqlx::query("SELECT * FROM raw_items WHERE collected_at >= ? ORDER BY id")
            .bind(to_millis(since))
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::new();
        for row in &rows {
            let it = item_from_row(row)?;
            if re.is_match(&it.title) || re.is_match(&it.content) {
                out.push(it);
            }
        }
        Ok(out)
    }

    async fn items_between(
        &self,
        source_type: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RawItem>> {
        let rows = match source_type {
            Some(st) => {
                sqlx::query(
                    "SELECT * FROM raw_items WHERE collected_at >= ? AND collected_at < ? \
                     AND lower(source_type) = lower(?) ORDER BY collected_at, id",
                )
                .bind(to_millis(since))
                .bind(to_millis(until))
                .bind(st)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM raw_items WHERE collected_at >= ? AND collected_at < ? \
                     ORDER BY collected_at, id",
                )
                .bind(to_millis(since))
                .bind(to_millis(until))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    async fn insert_analyses(&self, analyses: &[TopicAnalysis]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for a in analyses {
            sqlx::query(
                "INSERT INTO topic_analyses \
                 (topic, summary, keywords_json, sentiment, importance, source_count, \
                  supporting_ids_json, what, why_now, context, analyzed_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&a.topic)
            .bind(&a.summary)
            .bind(serde_json::to_string(&a.keywords)?)
            .bind(a.sentiment.as_str())
            .bind(a.importance)
            .bind(a.source_count)
            .bind(serde_json::to_string(&a.supporting_item_ids)?)
            .bind(&a.what)
            .bind(&a.why_now)
            .bind(&a.context)
            .bind(to_millis(a.analyzed_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(analyses.len())
    }

    async fn analyses_since(&self, since: DateTime<Utc>) -> Result<Vec<TopicAnalysis>> {
        let rows = sqlx::query(
            "SELECT * FROM topic_analyses WHERE analyzed_at >= ? ORDER BY analyzed_at DESC, id ASC",
        )
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(analysis_from_row).collect()
    }

    async fn prune_analyses(&self, before: DateTime<Utc>) -> Result<usize> {
        let done = sqlx::query("DELETE FROM topic_analyses WHERE analyzed_at < ?")
            .bind(to_millis(before))
            .execute(&self.pool)
            .await
            .context("pruning expired topic analyses")?;
        Ok(done.rows_affected() as usize)
    }
}

#[async_trait]
impl RankingStore for SqliteStore {
    async fn replace_period(&self, write: &PeriodWrite) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM issue_rankings WHERE period_start >= ?")
            .bind(to_millis(write.replace_from))
            .execute(&mut *tx)
            .await
            .context("deleting overlapping ranking rows")?;

        sqlx::query("DELETE FROM issue_rankings WHERE period_end < ?")
            .bind(to_millis(write.prune_before))
            .execute(&mut *tx)
            .await
            .context("pruning expired ranking rows")?;

        let sql = format!(
            "INSERT INTO issue_rankings ({RANKING_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        for r in &write.rows {
            sqlx::query(&sql)
                .bind(&r.topic)
                .bind(i64::from(r.rank))
                .bind(r.score)
                .bind(r.interest_score)
                .bind(r.mention_count)
                .bind(i64::from(r.source_diversity))
                .bind(r.sentiment.as_str())
                .bind(r.trend_direction.as_str())
                .bind(to_millis(r.period_start))
                .bind(to_millis(r.period_end))
                .bind(&r.description)
                .bind(&r.what)
                .bind(&r.why_now)
                .bind(&r.context)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("inserting ranking row '{}' (rank {})", r.topic, r.rank))?;
        }

        tx.commit().await.context("committing ranking replacement")?;
        debug!(
            target: "store",
            rows = write.rows.len(),
            replace_from = %write.replace_from,
            "ranking period replaced"
        );
        Ok(write.rows.len())
    }

    async fn latest_rankings(&self) -> Result<Vec<IssueRanking>> {
        let sql = format!(
            "SELECT {RANKING_COLUMNS} FROM issue_rankings \
             WHERE period_start = (SELECT MAX(period_start) FROM issue_rankings) \
             ORDER BY rank"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(ranking_from_row).collect()
    }

    async fn history_before(
        &self,
        topic: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<IssueRanking>> {
        let sql = format!(
            "SELECT {RANKING_COLUMNS} FROM issue_rankings \
             WHERE topic = ? AND period_end < ? ORDER BY period_end DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(topic)
            .bind(to_millis(before))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(ranking_from_row).collect()
    }

    async fn topic_history(&self, topic: &str, limit: usize) -> Result<Vec<IssueRanking>> {
        let sql = format!(
            "SELECT {RANKING_COLUMNS} FROM issue_rankings \
             WHERE topic = ? ORDER BY period_start DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(topic)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(ranking_from_row).collect()
    }
}
