// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /api/items, POST /api/analyses, POST /api/cycle
// - GET /api/rankings (limit clamp, lang translation)
// - GET /api/surge-trends, GET /api/trends/{topic}
// - GET /metrics
// - error mapping to 500 JSON

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use issue_pulse::api::{create_router, AppState};
use issue_pulse::cycle::{Engine, EngineConfig};
use issue_pulse::metrics::Metrics;
use issue_pulse::store::memory::InMemoryStore;
use issue_pulse::translate::{BoundedCache, CachedTranslator, PassthroughTranslator, Translator};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct Shouting;

#[async_trait]
impl Translator for Shouting {
    async fn translate(&self, text: &str, lang: &str) -> Result<String> {
        Ok(format!("[{lang}] {}", text.to_uppercase()))
    }
    fn name(&self) -> &'static str {
        "shouting"
    }
}

fn router_with(translator: Arc<dyn Translator>) -> Router {
    let engine = Engine::new(Arc::new(InMemoryStore::new()), EngineConfig::default());
    create_router(AppState::new(Arc::new(engine), translator))
}

fn test_router() -> Router {
    router_with(Arc::new(CachedTranslator::new(
        PassthroughTranslator,
        BoundedCache::new(16),
    )))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("build request");

    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

/// Seed two issues through the API and run one cycle.
async fn seed(app: &Router) {
    let now = Utc::now();
    let items = json!([
        {"id": 1, "sourceType": "youtube", "title": "Heatwave grid strain", "attributes": {"views": 5000}, "collectedAt": now - Duration::minutes(1)},
        {"id": 2, "sourceType": "reddit", "title": "Library hours cut", "attributes": {"upvotes": 10}, "collectedAt": now - Duration::minutes(2)}
    ]);
    let (status, body) = send(app, "POST", "/api/items", Some(items)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 2);

    let analyses = json!([
        {"topic": "Heatwave Grid Strain", "supportingItemIds": [1], "importance": 0.9, "sentiment": "negative",
         "whyNow": "record temperatures", "analyzedAt": now - Duration::minutes(3)},
        {"topic": "Library Hours Cut", "supportingItemIds": [2], "importance": 0.3,
         "what": "budget trims", "analyzedAt": now - Duration::minutes(3)}
    ]);
    let (status, body) = send(app, "POST", "/api/analyses", Some(analyses)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 2);

    let (status, body) = send(app, "POST", "/api/cycle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["rows"], 2);
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "ok");
}

#[tokio::test]
async fn cycle_on_empty_store_is_skipped() {
    let app = test_router();
    let (status, body) = send(&app, "POST", "/api/cycle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "skipped");
    assert_eq!(body["reason"], "no_analyses");

    let (status, body) = send(&app, "GET", "/api/rankings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rankings"], json!([]));
}

#[tokio::test]
async fn rankings_are_ordered_and_limit_is_clamped() {
    let app = test_router();
    seed(&app).await;

    let (status, body) = send(&app, "GET", "/api/rankings", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["rankings"].as_array().expect("rankings array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["topic"], "Heatwave Grid Strain");
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[0]["interestScore"], 5000);
    assert_eq!(rows[0]["sentiment"], "negative");
    assert_eq!(rows[0]["trendDirection"], "stable");
    assert_eq!(rows[0]["description"], "record temperatures");
    assert_eq!(rows[1]["interestScore"], 150);
    assert_eq!(rows[1]["description"], "budget trims");

    let (_, body) = send(&app, "GET", "/api/rankings?limit=0", None).await;
    assert_eq!(body["rankings"].as_array().unwrap().len(), 1);
    let (_, body) = send(&app, "GET", "/api/rankings?limit=50", None).await;
    assert_eq!(body["rankings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn lang_parameter_translates_topic_and_description() {
    let app = router_with(Arc::new(CachedTranslator::new(Shouting, BoundedCache::new(16))));
    seed(&app).await;

    let (_, body) = send(&app, "GET", "/api/rankings?limit=1&lang=de", None).await;
    let row = &body["rankings"][0];
    assert_eq!(row["topic"], "[de] HEATWAVE GRID STRAIN");
    assert_eq!(row["description"], "[de] RECORD TEMPERATURES");
    // untouched fields
    assert_eq!(row["whyNow"], "record temperatures");

    let (_, body) = send(&app, "GET", "/api/rankings?limit=1&lang=", None).await;
    assert_eq!(body["rankings"][0]["topic"], "Heatwave Grid Strain");
}

#[tokio::test]
async fn surge_trends_and_topic_history() {
    let app = test_router();
    seed(&app).await;

    // a single fresh snapshot has no baseline older than the cutoff
    let (status, body) = send(&app, "GET", "/api/surge-trends?limit=3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["surges"], json!([]));

    let (status, body) = send(&app, "GET", "/api/trends/Heatwave%20Grid%20Strain?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "Heatwave Grid Strain");
    assert_eq!(body["history"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", "/api/trends/Nothing%20Here", None).await;
    assert_eq!(body["history"], json!([]));
}

struct Offline;

#[async_trait]
impl Translator for Offline {
    async fn translate(&self, _text: &str, _lang: &str) -> Result<String> {
        anyhow::bail!("translation backend offline")
    }
    fn name(&self) -> &'static str {
        "offline"
    }
}

#[tokio::test]
async fn handler_errors_map_to_500_json() {
    // uncached translator: its error reaches the handler
    let app = router_with(Arc::new(Offline));
    seed(&app).await;
    let (status, body) = send(&app, "GET", "/api/rankings?lang=fr", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("offline"));
}

#[tokio::test]
async fn malformed_ingest_body_is_rejected() {
    let app = test_router();
    let (status, _) = send(&app, "POST", "/api/items", Some(json!({"not": "a list"}))).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn metrics_endpoint_contains_cycle_series() {
    let metrics = Metrics::init().expect("install recorder");
    let app = test_router().merge(metrics.router());
    seed(&app).await;

    let req = Request::get("/metrics").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    for needle in ["pulse_cycles_total", "pulse_cycle_ms", "pulse_ranked_issues"] {
        assert!(text.contains(needle), "missing {needle} in /metrics output");
    }
}
