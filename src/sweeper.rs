//! Background clock sweep.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::arena::{ArenaService, SweepReport};

/// Shortest period the sweeper will tick at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawns a task that runs [`ArenaService::sweep_expired`] every `period`
/// until `shutdown` carries `true` or its sender is dropped. A zero period
/// is raised to one millisecond.
#[instrument(skip(service, shutdown))]
pub fn spawn_sweeper(
    service: ArenaService,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    if period < MIN_PERIOD {
        warn!(?period, "Sweep period too short, using minimum");
    }
    let period = period.max(MIN_PERIOD);
    info!(?period, "Starting clock sweeper");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep_once(service.clone()).await {
                        error!(error = %e, "Sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Clock sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}

/// Runs one sweep on the blocking pool.
///
/// # Errors
///
/// Returns an error if the sweep failed or its task panicked.
pub async fn sweep_once(service: ArenaService) -> anyhow::Result<SweepReport> {
    let report = tokio::task::spawn_blocking(move || service.sweep_expired())
        .await
        .map_err(|e| {
            warn!(error = %e, "Sweep task did not complete");
            anyhow::anyhow!("sweep task failed: {}", e)
        })??;
    debug!(
        forfeited = report.forfeited.len(),
        expired = report.expired_invitations.len(),
        "Sweep tick"
    );
    Ok(report)
}
