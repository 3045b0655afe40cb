use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::cycle::{CycleOutcome, Engine};
use crate::model::{IssueRanking, RawItem, SurgeTrend, TopicAnalysis};
use crate::ranking::MAX_RANKED;
use crate::surge;
use crate::translate::DynTranslator;

const DEFAULT_HISTORY: usize = 24;
const MAX_HISTORY: usize = 288;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub translator: DynTranslator,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, translator: DynTranslator) -> Self {
        Self { engine, translator }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/rankings", get(rankings))
        .route("/api/surge-trends", get(surge_trends))
        .route("/api/trends/{topic}", get(topic_trend))
        .route("/api/items", post(ingest_items))
        .route("/api/analyses", post(ingest_analyses))
        .route("/api/cycle", post(trigger_cycle))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Any handler error becomes a 500 with a JSON body.
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = format!("{:#}", self.0);
        tracing::warn!(target: "api", %error, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
    lang: Option<String>,
}

impl ListQuery {
    fn lang(&self) -> Option<&str> {
        self.lang.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}

#[derive(Serialize)]
struct RankingsOut {
    rankings: Vec<IssueRanking>,
}

async fn rankings(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<RankingsOut>> {
    let mut rows = state.engine.store().latest_rankings().await?;
    rows.truncate(q.limit.unwrap_or(MAX_RANKED).clamp(1, MAX_RANKED));
    if let Some(lang) = q.lang() {
        for r in &mut rows {
            r.topic = state.translator.translate(&r.topic, lang).await?;
            r.description = state.translator.translate(&r.description, lang).await?;
        }
    }
    Ok(Json(RankingsOut { rankings: rows }))
}

#[derive(Serialize)]
struct SurgesOut {
    surges: Vec<SurgeTrend>,
}

async fn surge_trends(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<SurgesOut>> {
    let limit = q.limit.unwrap_or(surge::DEFAULT_LIMIT);
    let mut surges = state.engine.detect_surges(limit, Utc::now()).await?;
    if let Some(lang) = q.lang() {
        for s in &mut surges {
            s.topic = state.translator.translate(&s.topic, lang).await?;
            s.description = state.translator.translate(&s.description, lang).await?;
        }
    }
    Ok(Json(SurgesOut { surges }))
}

#[derive(Serialize)]
struct HistoryOut {
    topic: String,
    history: Vec<IssueRanking>,
}

async fn topic_trend(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<HistoryOut>> {
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    let history = state.engine.store().topic_history(&topic, limit).await?;
    Ok(Json(HistoryOut { topic, history }))
}

#[derive(Serialize)]
struct InsertedOut {
    inserted: usize,
}

async fn ingest_items(
    State(state): State<AppState>,
    Json(items): Json<Vec<RawItem>>,
) -> ApiResult<Json<InsertedOut>> {
    let inserted = state.engine.store().insert_items(&items).await?;
    info!(target: "api", received = items.len(), inserted, "raw items ingested");
    Ok(Json(InsertedOut { inserted }))
}

async fn ingest_analyses(
    State(state): State<AppState>,
    Json(analyses): Json<Vec<TopicAnalysis>>,
) -> ApiResult<Json<InsertedOut>> {
    let inserted = state.engine.store().insert_analyses(&analyses).await?;
    info!(target: "api", inserted, "topic analyses ingested");
    Ok(Json(InsertedOut { inserted }))
}

async fn trigger_cycle(State(state): State<AppState>) -> ApiResult<Response> {
    let outcome = state.engine.run_cycle(Utc::now()).await?;
    let label = outcome.label();
    let resp = match outcome {
        CycleOutcome::Completed { rows } => {
            Json(json!({ "outcome": label, "rows": rows })).into_response()
        }
        CycleOutcome::Skipped(reason) => {
            Json(json!({ "outcome": label, "reason": reason.as_str() })).into_response()
        }
        CycleOutcome::SkippedBusy => (
            StatusCode::CONFLICT,
            Json(json!({ "outcome": label })),
        )
            .into_response(),
    };
    Ok(resp)
}
