// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cycle::{CycleOutcome, Engine};

#[derive(Clone, Copy, Debug)]
pub struct CycleSchedulerCfg {
    pub interval_secs: u64,
    /// A cycle still running after this long is cancelled; its write rolls back.
    pub deadline_secs: u64,
}

/// Run one cycle under the deadline. `None` when the deadline elapsed.
pub async fn run_with_deadline(
    engine: &Engine,
    deadline: Duration,
) -> Option<anyhow::Result<CycleOutcome>> {
    match tokio::time::timeout(deadline, engine.run_cycle(chrono::Utc::now())).await {
        Ok(result) => Some(result),
        Err(_) => {
            counter!("pulse_cycle_failures_total").increment(1);
            counter!("pulse_cycles_total", "outcome" => "timeout").increment(1);
            tracing::warn!(
                target: "cycle",
                deadline_secs = deadline.as_secs(),
                "cycle exceeded deadline; cancelled"
            );
            None
        }
    }
}

/// Spawn the periodic ranking loop. Ticks that fall behind are skipped,
/// never bunched up, and the engine's guard rejects any overlap.
pub fn spawn_cycle_scheduler(engine: Arc<Engine>, cfg: CycleSchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = Duration::from_secs(cfg.deadline_secs.max(1));
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match run_with_deadline(&engine, deadline).await {
                Some(Ok(outcome)) => {
                    tracing::debug!(target: "cycle", outcome = outcome.label(), "scheduled cycle finished");
                }
                // already logged and counted by the engine
                Some(Err(_)) | None => {}
            }
        }
    })
}
