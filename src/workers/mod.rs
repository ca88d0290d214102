//! Long-running periodic jobs, supervised with a shared shutdown signal.

pub mod archiver;
pub mod pruner;

pub use archiver::{ArchiveRunSummary, Archiver};
pub use pruner::ActivityPruner;

use crate::state::AppState;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawn the archiver and the activity pruner. Both stop cleanly when the
/// shutdown channel flips to true; a tick in flight finishes first.
pub fn spawn_workers(state: AppState, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let archive_interval = Duration::from_secs(state.config.archive_interval_secs);
    let cleanup_interval = Duration::from_secs(state.config.cleanup_interval_secs);

    let archiver = tokio::spawn(run_periodic(
        "archiver",
        archive_interval,
        shutdown.clone(),
        state.clone(),
        |state| async move {
            let started = Instant::now();
            match Archiver::run_once(&state).await {
                Ok(summary) => {
                    crate::metrics::record_archive_run_duration(started.elapsed());
                    if summary.units_ok + summary.units_failed > 0 {
                        tracing::info!(
                            units_ok = summary.units_ok,
                            units_failed = summary.units_failed,
                            messages = summary.messages_archived,
                            "archiver tick finished"
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "archiver tick failed"),
            }
        },
    ));

    let pruner = tokio::spawn(run_periodic(
        "activity_pruner",
        cleanup_interval,
        shutdown,
        state,
        |state| async move {
            if let Err(e) = ActivityPruner::run_once(&state).await {
                tracing::error!(error = %e, "activity pruner tick failed");
            }
        },
    ));

    vec![archiver, pruner]
}

async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    state: AppState,
    tick: F,
) where
    F: Fn(AppState) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    // The immediate first tick is a startup catch-up run.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(worker = name, period_secs = period.as_secs(), "worker started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick(state.clone()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!(worker = name, "worker stopping");
                    return;
                }
            }
        }
    }
}
