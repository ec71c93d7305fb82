//! Foreground tick loop.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::{Report, SessionEffects, SessionOrchestrator};
use crate::recovery::SnapshotStore;

const TICK: Duration = Duration::from_secs(1);

/// Feed the orchestrator one tick per second until `shutdown` resolves.
///
/// The real gap since the last applied second is measured on every wakeup,
/// so time lost to a suspended process is applied through
/// [`SessionOrchestrator::catch_up`] instead of being dropped. `on_step` is
/// called after every applied step, empty report or not, and stops the loop
/// by returning `ControlFlow::Break`. Hiding on shutdown is up to the caller.
pub async fn run_until<E, S, F, R>(
    orchestrator: &mut SessionOrchestrator<E, S>,
    shutdown: F,
    mut on_step: R,
) where
    E: SessionEffects,
    S: SnapshotStore,
    F: Future<Output = ()>,
    R: FnMut(&SessionOrchestrator<E, S>, &Report) -> ControlFlow<()>,
{
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;
    let mut last = Instant::now();

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("tick loop stopping");
                break;
            }
            _ = interval.tick() => {
                let gap = Instant::now().duration_since(last).as_secs();
                if gap == 0 {
                    continue;
                }
                last += Duration::from_secs(gap);

                let report = if gap == 1 {
                    orchestrator.tick()
                } else {
                    tracing::info!(gap, "tick loop fell behind");
                    orchestrator.catch_up(gap)
                };
                if on_step(orchestrator, &report).is_break() {
                    tracing::debug!("tick loop stopped by caller");
                    break;
                }
            }
        }
    }
}
