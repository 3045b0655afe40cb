use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time registration so series carry help text on /metrics.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pulse_cycles_total", "Ranking cycles by outcome.");
        describe_counter!(
            "pulse_cycle_failures_total",
            "Cycles that failed to write or exceeded their deadline."
        );
        describe_counter!(
            "pulse_lookup_errors_total",
            "Per-group item lookups that failed and counted as zero."
        );
        describe_histogram!("pulse_cycle_ms", "Ranking cycle duration in milliseconds.");
        describe_gauge!("pulse_ranked_issues", "Rows written by the last completed cycle.");
        describe_gauge!("pulse_last_cycle_ts", "Unix ts of the last completed cycle.");
        describe_gauge!("pulse_surges_detected", "Surges found by the last detection pass.");
    });
}

impl Metrics {
    /// Install the Prometheus recorder. The recorder is process-global, so
    /// repeated calls share the first handle.
    pub fn init() -> Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
            .context("prometheus: install recorder")?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
