use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::error::EngineError;
use crate::services::{DamService, RecalculationService};

/// Periodically bring every dam's stale snapshots up to date.
///
/// Returns immediately when `interval_minutes` is 0.
#[instrument(skip(dam_service, recalculation), fields(interval_minutes = %interval_minutes))]
pub async fn start_recompute_scheduler(
    dam_service: DamService,
    recalculation: RecalculationService,
    interval_minutes: u64,
) {
    if interval_minutes == 0 {
        info!("Recompute scheduler disabled");
        return;
    }

    let mut interval = time::interval(Duration::from_secs(interval_minutes * 60));
    info!("Recompute scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Scheduler tick - recomputing stale snapshots");

        match recompute_stale_dams(&dam_service, &recalculation).await {
            Ok(0) => debug!("All snapshots fresh"),
            Ok(recomputed) => info!("Recomputed {} stale snapshots", recomputed),
            Err(e) => error!("Failed to list dams for recompute: {}", e),
        }
    }
}

/// One pass over every dam. Transient database failures are retried per dam;
/// a dam that still fails is logged and skipped.
#[instrument(skip(dam_service, recalculation))]
pub async fn recompute_stale_dams(
    dam_service: &DamService,
    recalculation: &RecalculationService,
) -> Result<usize, EngineError> {
    let dams = dam_service.list_dams().await?;
    let mut recomputed = 0;

    for dam in dams {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(3);

        let result = (|| recalculation.recompute_stale(dam.id))
            .retry(backoff)
            .when(EngineError::is_transient)
            .notify(|e, delay| {
                warn!(dam_id = dam.id, error = %e, ?delay, "Transient failure, retrying");
            })
            .await;

        match result {
            Ok(reports) => recomputed += reports.len(),
            Err(e) => error!(dam_id = dam.id, error = %e, "Recompute failed"),
        }
    }

    Ok(recomputed)
}
