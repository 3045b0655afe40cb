//! Issue Pulse binary entrypoint.
//! Boots the ranking scheduler and the Axum HTTP server over a SQLite store.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use issue_pulse::api::{create_router, AppState};
use issue_pulse::config::PulseConfig;
use issue_pulse::cycle::Engine;
use issue_pulse::metrics::Metrics;
use issue_pulse::scheduler::{spawn_cycle_scheduler, CycleSchedulerCfg};
use issue_pulse::store::sqlite::SqliteStore;
use issue_pulse::translate::{BoundedCache, CachedTranslator, PassthroughTranslator};

/// Compact logs by default; `PULSE_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("issue_pulse=info,warn"));

    let json = std::env::var("PULSE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PulseConfig::load_default().context("load config")?;
    let metrics = Metrics::init()?;

    let store = SqliteStore::open(&cfg.storage.db_path, cfg.storage.max_items)
        .await
        .with_context(|| format!("open store at {}", cfg.storage.db_path.display()))?;
    let engine = Arc::new(Engine::new(Arc::new(store), cfg.engine_config()));

    let translator = CachedTranslator::new(
        PassthroughTranslator,
        BoundedCache::new(cfg.translation.cache_capacity),
    );
    let state = AppState::new(engine.clone(), Arc::new(translator));

    let scheduler = spawn_cycle_scheduler(
        engine,
        CycleSchedulerCfg {
            interval_secs: cfg.cycle.interval_secs,
            deadline_secs: cfg.cycle.deadline_secs,
        },
    );

    let app = create_router(state).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "issue-pulse listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")?;

    scheduler.abort();
    Ok(())
}
