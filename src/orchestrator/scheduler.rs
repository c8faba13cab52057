//! Fixed-interval driver for the orchestration cycle.
//!
//! The scheduler owns the cycle and awaits each tick before waiting for
//! the next one. Ticks that would have fired while a slow tick was still
//! running are skipped rather than queued.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::cycle::OrchestrationCycle;

/// Run ticks every `interval` until `cancel` fires.
///
/// The first tick runs immediately. A tick in progress when cancellation
/// arrives is allowed to finish.
pub async fn run_forever(
    mut cycle: OrchestrationCycle,
    interval: Duration,
    cancel: CancellationToken,
) -> OrchestrationCycle {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_ms = interval.as_millis(), "orchestration loop started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(ticks = cycle.ticks(), "orchestration loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = cycle.run_tick().await {
                    error!(%err, "tick skipped");
                }
            }
        }
    }
    cycle
}

/// Spawn [`run_forever`] as a background task.
///
/// The handle resolves to the cycle after shutdown so callers can inspect
/// its final state.
#[must_use]
pub fn spawn_cycle_loop(
    cycle: OrchestrationCycle,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<OrchestrationCycle> {
    tokio::spawn(run_forever(cycle, interval, cancel))
}
