use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::db::{Category, SnapshotRepository, StoredSnapshot};
use crate::dependency_graph;
use crate::derivation;
use crate::error::EngineError;
use crate::services::dam_locks::DamLocks;
use crate::services::dam_service::DamService;
use crate::services::recalculation_service::{RecalculationService, RecomputeReport};

/// Result of an input write: the stored snapshot plus one report per
/// snapshot derived, the written category first.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub snapshot: StoredSnapshot,
    pub reports: Vec<RecomputeReport>,
}

#[derive(Clone)]
pub struct TelemetryService {
    snapshots: Arc<dyn SnapshotRepository>,
    dam_service: DamService,
    recalculation: RecalculationService,
    locks: DamLocks,
}

impl TelemetryService {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        dam_service: DamService,
        recalculation: RecalculationService,
        locks: DamLocks,
    ) -> Self {
        Self {
            snapshots,
            dam_service,
            recalculation,
            locks,
        }
    }

    /// Merge `patch` into the category's inputs, derive, and bring dependent
    /// categories up to date. The snapshot and its dependents are stored in
    /// one atomic upsert.
    ///
    /// A `null` value clears that input. Unknown or derived field names and
    /// out-of-range values are rejected before anything is written.
    #[instrument(skip(self, patch), fields(dam_id = %dam_id, category = %category))]
    pub async fn write_inputs(
        &self,
        dam_id: i64,
        category: Category,
        patch: &Value,
    ) -> Result<WriteOutcome, EngineError> {
        let Some(patch) = patch.as_object() else {
            return Err(EngineError::InvalidInput(
                "inputs must be a JSON object".to_string(),
            ));
        };

        let dam = self.dam_service.get_dam(dam_id).await?;
        let _guard = self.locks.lock(dam_id).await;
        let mut snapshot = self
            .snapshots
            .get(category, dam_id)
            .await?
            .unwrap_or_else(|| StoredSnapshot::empty(dam_id, category));

        let mut inputs = snapshot.inputs.as_object().cloned().unwrap_or_default();
        for (field, value) in patch {
            if value.is_null() {
                inputs.remove(field);
            } else {
                inputs.insert(field.clone(), value.clone());
            }
        }
        let inputs = Value::Object(inputs);
        derivation::validate_inputs(category, &inputs).inspect_err(|e| {
            warn!(error = %e, "Rejected input write");
        })?;

        snapshot.inputs = inputs;
        snapshot.input_revision += 1;
        debug!(
            input_revision = snapshot.input_revision,
            fields = patch.len(),
            "Inputs merged"
        );

        let (stored, reports) = self.recalculation.write_locked(&dam, snapshot).await?;

        info!(
            input_revision = stored.input_revision,
            dependents = reports.len().saturating_sub(1),
            "Telemetry written"
        );
        Ok(WriteOutcome {
            snapshot: stored,
            reports,
        })
    }

    pub async fn get_snapshot(
        &self,
        dam_id: i64,
        category: Category,
    ) -> Result<StoredSnapshot, EngineError> {
        self.dam_service.get_dam(dam_id).await?;
        self.snapshots
            .get(category, dam_id)
            .await?
            .ok_or_else(|| EngineError::snapshot_not_found(dam_id, category))
    }

    pub async fn list_snapshots(&self, dam_id: i64) -> Result<Vec<StoredSnapshot>, EngineError> {
        self.dam_service.get_dam(dam_id).await?;
        Ok(self.snapshots.list_for_dam(dam_id).await?)
    }

    /// Administrative delete. Dependents are recomputed and will report the
    /// missing upstream.
    #[instrument(skip(self), fields(dam_id = %dam_id, category = %category))]
    pub async fn purge_snapshot(
        &self,
        dam_id: i64,
        category: Category,
    ) -> Result<Vec<RecomputeReport>, EngineError> {
        let dam = self.dam_service.get_dam(dam_id).await?;
        let _guard = self.locks.lock(dam_id).await;
        if !self.snapshots.purge(category, dam_id).await? {
            return Err(EngineError::snapshot_not_found(dam_id, category));
        }
        info!("Snapshot purged");

        self.recalculation
            .recompute_locked(&dam, &dependency_graph::dependents_of(category)?)
            .await
    }
}
