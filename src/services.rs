pub mod dam_locks;
pub mod dam_service;
pub mod recalculation_service;
pub mod telemetry_service;
pub mod view_service;

pub use dam_locks::DamLocks;
pub use dam_service::{BasinSummary, DamService};
pub use recalculation_service::{
    BatchRecomputeReport, DamFailure, RecalculationService, RecomputeReport,
};
pub use telemetry_service::{TelemetryService, WriteOutcome};
pub use view_service::{ActiveAlert, AlertFilter, ClassificationResponse, ViewService};

use std::sync::Arc;
use tracing::{instrument, warn};

use crate::db::{Dam, DamRepository, NewDam, SnapshotRepository};
use crate::error::EngineError;

/// Every service wired over one pair of repositories and one lock map.
#[derive(Clone)]
pub struct Services {
    pub dams: DamService,
    pub telemetry: TelemetryService,
    pub recalculation: RecalculationService,
    pub views: ViewService,
}

impl Services {
    pub fn new(
        dam_repo: Arc<dyn DamRepository>,
        snapshot_repo: Arc<dyn SnapshotRepository>,
        recompute_concurrency: usize,
        alert_score_threshold: f64,
    ) -> Self {
        let locks = DamLocks::new();
        let dams = DamService::new(dam_repo);
        let recalculation = RecalculationService::new(
            snapshot_repo.clone(),
            dams.clone(),
            locks.clone(),
            recompute_concurrency,
        );
        let telemetry = TelemetryService::new(
            snapshot_repo.clone(),
            dams.clone(),
            recalculation.clone(),
            locks,
        );
        let views = ViewService::new(snapshot_repo, dams.clone(), alert_score_threshold);

        Self {
            dams,
            telemetry,
            recalculation,
            views,
        }
    }

    /// Create a dam, then refresh the basin aggregates of every dam it joins.
    ///
    /// The dam is created even if the refresh fails; the periodic stale
    /// recompute picks up the changed basin later.
    #[instrument(skip(self, dam), fields(name = %dam.name))]
    pub async fn register_dam(&self, dam: &NewDam) -> Result<Dam, EngineError> {
        let created = self.dams.create_dam(dam).await?;
        if let Err(e) = self.recalculation.recompute_basin(created.id).await {
            warn!(dam_id = created.id, error = %e, "Basin refresh failed after dam creation");
        }
        Ok(created)
    }
}
