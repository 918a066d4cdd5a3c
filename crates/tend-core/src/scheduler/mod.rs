//! Periodic trigger for materialization runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::materialize::Materializer;
use crate::store::TaskStore;

/// Default interval between runs, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 300_000;

/// Current wall-clock time on the local timeline plans are written in.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Run `materializer` every `interval` until `cancel` fires.
///
/// The first run happens immediately. A run in progress is allowed to
/// finish; cancellation is only observed between runs. Returns the number
/// of runs performed.
pub async fn run_periodic<S: TaskStore>(
    materializer: Arc<Materializer<S>>,
    interval: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        ?interval,
        look_ahead_hours = materializer.config().look_ahead_hours,
        "periodic materialization started"
    );

    let mut runs = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tracing::info!("starting scheduled task generation");
        let report = materializer.run(local_now()).await;
        runs += 1;
        tracing::info!(
            created = report.tasks_created(),
            failed = report.plans_failed(),
            "scheduled task generation finished"
        );
    }

    tracing::info!(runs, "periodic materialization stopped");
    runs
}
