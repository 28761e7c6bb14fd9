//! Background poll loop covering confirmations the webhook never
//! delivered.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::metrics::Metrics;
use crate::services::reconciliation::ReconciliationEngine;

/// Spawn the periodic pending-request sweep.
///
/// The engine's own single-flight guard makes overlapping ticks skip
/// rather than stack, so a slow provider cannot pile sweeps on itself.
pub fn start_pending_sweeper(
    engine: Arc<ReconciliationEngine>,
    metrics: Arc<Metrics>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(period_secs = period.as_secs(), "pending-request sweeper started");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let timer = metrics.sweep_duration_seconds.start_timer();
            match engine.sweep_pending().await {
                Ok(Some(summary)) => {
                    metrics.record_sweep(&summary);
                    if summary.updated > 0 || summary.errors > 0 {
                        tracing::info!(
                            scanned = summary.scanned,
                            updated = summary.updated,
                            confirmed = summary.confirmed,
                            conflicts = summary.conflicts,
                            errors = summary.errors,
                            "pending sweep finished"
                        );
                    } else {
                        tracing::debug!(scanned = summary.scanned, "pending sweep finished, no changes");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "pending sweep failed");
                }
            }
            timer.observe_duration();
        }
    })
}
