//! The outer loop: forever, reinitialize per-cycle clients, run one cycle,
//! record the outcome, and sleep until the next iteration or a shutdown signal.

use std::time::Duration;

use error_stack::{Report, ResultExt};
use time::OffsetDateTime;
use tracing::{error, warn};

use crate::{
    config::file::Config,
    cycle::{self, CycleOutcome},
    router::RoutingTable,
    stats::Stats,
    tracker::Tracker,
    worker::Worker,
};

/// How long the supervisor sleeps between cycles, absent a shutdown signal.
pub const DEFAULT_LOOP_DELAY: Duration = Duration::from_secs(120);

/// Errors initializing the per-cycle clients and worker set.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Constructing a branch worker failed.
    #[error("initialize worker for branch '{0}'")]
    InitWorker(String),
}

/// Run the supervisor loop forever.
///
/// Every iteration reinitializes the tracker client, every branch worker, and
/// the routing table from `config`, so a poisoned connection or stale
/// credential cannot outlive one cycle. `since` starts at `now - lookback` and
/// thereafter advances to the start time of the last successful cycle.
///
/// This future never resolves; the caller is expected to race it against a
/// shutdown signal and drop it to cancel, rather than passing a signal in.
#[tracing::instrument(skip_all)]
pub async fn run(config: &Config) -> ! {
    let mut stats = Stats::new();
    stats.declare("runs_successful");
    stats.declare("runs_failed");

    let mut since = OffsetDateTime::now_utc() - *config.patchwork().lookback();

    loop {
        run_one_iteration(config, &mut stats, &mut since).await;
        tokio::time::sleep(DEFAULT_LOOP_DELAY).await;
    }
}

async fn run_one_iteration(config: &Config, stats: &mut Stats, since: &mut OffsetDateTime) {
    let mut workers = match build_workers(config).await {
        Ok(workers) => workers,
        Err(err) => {
            warn!("skipping this cycle, could not initialize workers: {err:?}");
            return;
        }
    };

    let tracker = Tracker::new(config.patchwork().clone());
    let router = config.routing().clone();

    match run_cycle_recording(&mut workers, &tracker, &router, config, stats, *since).await {
        Ok(outcome) => {
            stats.increment_counter("runs_successful", true).ok();
            *since = outcome.next_since;
        }
        Err(err) => {
            stats.increment_counter("runs_failed", true).ok();
            record_unhandled(stats, &err);
            error!("cycle failed: {err:?}");
        }
    }
}

async fn run_cycle_recording(
    workers: &mut [Worker],
    tracker: &Tracker,
    router: &RoutingTable,
    config: &Config,
    stats: &mut Stats,
    since: OffsetDateTime,
) -> Result<CycleOutcome, Report<cycle::Error>> {
    cycle::run_cycle(
        workers,
        tracker,
        router,
        config.patchwork().project(),
        config.email().as_ref(),
        stats,
        since,
    )
    .await
}

async fn build_workers(config: &Config) -> Result<Vec<Worker>, Report<Error>> {
    let mut workers = Vec::with_capacity(config.branches().len());
    for (name, branch) in config.branches().iter() {
        let worker = Worker::new(name, branch.clone(), config.base_directory())
            .await
            .change_context_lazy(|| Error::InitWorker(name.to_string()))?;
        workers.push(worker);
    }
    Ok(workers)
}

/// Bump a counter named `unhandled_<variant>` for telemetry, mirroring the
/// tracker/worker/code-host/reconciler error kind that escaped a cycle.
fn record_unhandled(stats: &mut Stats, err: &Report<cycle::Error>) {
    let kind = match err.current_context() {
        cycle::Error::Tracker => "Tracker",
    };
    stats.increment_counter(&format!("unhandled_{kind}"), true).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loop_delay_is_two_minutes() {
        assert_eq!(DEFAULT_LOOP_DELAY, Duration::from_secs(120));
    }
}
