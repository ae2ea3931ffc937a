use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::db::{Category, Dam, SnapshotRepository, StoredSnapshot};
use crate::dependency_graph;
use crate::derivation::{self, BasinContext, CrossEntityInputs, DamLinks, DerivationNote};
use crate::error::EngineError;
use crate::services::dam_locks::DamLocks;
use crate::services::dam_service::DamService;

/// Outcome of deriving one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeReport {
    pub dam_id: i64,
    pub category: Category,
    /// False when the stored derived block was already up to date.
    pub changed: bool,
    #[schema(value_type = Vec<Object>)]
    pub notes: Vec<DerivationNote>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DamFailure {
    pub dam_id: i64,
    pub error: String,
}

/// Outcome of recomputing one category across every dam holding it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecomputeReport {
    pub category: Category,
    pub dams_processed: usize,
    pub snapshots_changed: usize,
    pub reports: Vec<RecomputeReport>,
    pub failures: Vec<DamFailure>,
}

/// Runs derivations and keeps dependent categories in step.
#[derive(Clone)]
pub struct RecalculationService {
    snapshots: Arc<dyn SnapshotRepository>,
    dam_service: DamService,
    locks: DamLocks,
    concurrency: usize,
}

impl RecalculationService {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        dam_service: DamService,
        locks: DamLocks,
        concurrency: usize,
    ) -> Self {
        Self {
            snapshots,
            dam_service,
            locks,
            concurrency: concurrency.max(1),
        }
    }

    /// Recompute `category` for a dam, then every category that depends on it.
    #[instrument(skip(self), fields(dam_id = %dam_id, category = %category))]
    pub async fn recompute_category(
        &self,
        dam_id: i64,
        category: Category,
    ) -> Result<Vec<RecomputeReport>, EngineError> {
        let dam = self.dam_service.get_dam(dam_id).await?;
        let _guard = self.locks.lock(dam_id).await;
        if self.snapshots.get(category, dam_id).await?.is_none() {
            return Err(EngineError::snapshot_not_found(dam_id, category));
        }

        let mut categories = vec![category];
        categories.extend(dependency_graph::dependents_of(category)?);
        self.recompute_locked(&dam, &categories).await
    }

    /// Recompute every snapshot the dam has, upstream categories first.
    #[instrument(skip(self), fields(dam_id = %dam_id))]
    pub async fn recompute_all_categories(
        &self,
        dam_id: i64,
    ) -> Result<Vec<RecomputeReport>, EngineError> {
        let dam = self.dam_service.get_dam(dam_id).await?;
        let _guard = self.locks.lock(dam_id).await;
        let mut workspace = self.load(dam_id).await?;
        let categories: Vec<Category> = workspace.snapshots.keys().copied().collect();
        let reports = self.derive_in(&dam, &mut workspace, &categories).await?;
        self.persist(&mut workspace).await?;
        Ok(reports)
    }

    /// Recompute only snapshots whose derived block no longer matches their
    /// own inputs, their upstream revisions or the dam's basin, plus
    /// everything downstream of them.
    #[instrument(skip(self), fields(dam_id = %dam_id))]
    pub async fn recompute_stale(&self, dam_id: i64) -> Result<Vec<RecomputeReport>, EngineError> {
        let dam = self.dam_service.get_dam(dam_id).await?;
        let _guard = self.locks.lock(dam_id).await;
        let mut workspace = self.load(dam_id).await?;

        let basin = if workspace.snapshots.contains_key(&Category::BasinAggregated) {
            Some(self.basin_context(dam_id, &mut workspace).await?)
        } else {
            None
        };

        let mut stale = BTreeSet::new();
        for (category, snapshot) in &workspace.snapshots {
            let upstream = workspace.upstream_revisions(*category);
            let expected_basin = match category {
                Category::BasinAggregated => basin.as_ref(),
                _ => None,
            };
            if !snapshot.is_fresh(&upstream, expected_basin) {
                stale.insert(*category);
                stale.extend(dependency_graph::dependents_of(*category)?);
            }
        }

        if stale.is_empty() {
            debug!("All snapshots are fresh");
            return Ok(Vec::new());
        }
        info!(stale = stale.len(), "Recomputing stale snapshots");
        let categories: Vec<Category> = stale.into_iter().collect();
        let reports = self.derive_in(&dam, &mut workspace, &categories).await?;
        self.persist(&mut workspace).await?;
        Ok(reports)
    }

    /// Recompute `BasinAggregated` and its dependents on every dam in the
    /// basin of `dam_id`, one member lock at a time.
    ///
    /// Run after the basin's dam links change.
    #[instrument(skip(self), fields(dam_id = %dam_id))]
    pub async fn recompute_basin(&self, dam_id: i64) -> Result<Vec<RecomputeReport>, EngineError> {
        let mut categories = vec![Category::BasinAggregated];
        categories.extend(dependency_graph::dependents_of(Category::BasinAggregated)?);

        let members = self.dam_service.basin_members(dam_id).await?;
        let mut reports = Vec::new();
        for member in &members {
            let _guard = self.locks.lock(member.id).await;
            reports.extend(self.recompute_locked(member, &categories).await?);
        }

        info!(
            members = members.len(),
            changed = reports.iter().filter(|r| r.changed).count(),
            "Basin recomputed"
        );
        Ok(reports)
    }

    /// Recompute one category on every dam that holds it.
    ///
    /// Dams are processed with bounded concurrency; a failing dam is recorded
    /// in the report and does not stop the batch.
    #[instrument(skip(self), fields(category = %category))]
    pub async fn recompute_category_for_all_dams(
        &self,
        category: Category,
    ) -> Result<BatchRecomputeReport, EngineError> {
        let dam_ids: Vec<i64> = self
            .snapshots
            .list_by_filter(category, &|_: &StoredSnapshot| true)
            .await?
            .into_iter()
            .map(|s| s.dam_id)
            .collect();
        info!(
            dams = dam_ids.len(),
            concurrency = self.concurrency,
            "Starting bulk recompute"
        );

        let results: Vec<(i64, Result<Vec<RecomputeReport>, EngineError>)> =
            stream::iter(dam_ids)
                .map(|dam_id| async move {
                    (dam_id, self.recompute_category(dam_id, category).await)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let dams_processed = results.len();
        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for (dam_id, result) in results {
            match result {
                Ok(dam_reports) => reports.extend(dam_reports),
                Err(e) => {
                    warn!(dam_id, error = %e, "Recompute failed for dam");
                    failures.push(DamFailure {
                        dam_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        reports.sort_by_key(|r| (r.dam_id, r.category));
        failures.sort_by_key(|f| f.dam_id);
        let snapshots_changed = reports.iter().filter(|r| r.changed).count();

        info!(
            dams_processed,
            snapshots_changed,
            failures = failures.len(),
            "Bulk recompute finished"
        );
        Ok(BatchRecomputeReport {
            category,
            dams_processed,
            snapshots_changed,
            reports,
            failures,
        })
    }

    /// Recompute `categories` for `dam` in dependency order and store every
    /// changed snapshot in one atomic upsert. Categories without a snapshot
    /// are skipped. The caller holds the dam lock.
    pub(crate) async fn recompute_locked(
        &self,
        dam: &Dam,
        categories: &[Category],
    ) -> Result<Vec<RecomputeReport>, EngineError> {
        let mut workspace = self.load(dam.id).await?;
        let reports = self.derive_in(dam, &mut workspace, categories).await?;
        self.persist(&mut workspace).await?;
        Ok(reports)
    }

    /// Derive a snapshot whose inputs were just written, then its dependents,
    /// and store all of them together. Nothing is stored if any step fails.
    /// The caller holds the dam lock.
    pub(crate) async fn write_locked(
        &self,
        dam: &Dam,
        snapshot: StoredSnapshot,
    ) -> Result<(StoredSnapshot, Vec<RecomputeReport>), EngineError> {
        let category = snapshot.category;
        let mut workspace = self.load(dam.id).await?;
        workspace.stage(snapshot);

        let mut categories = vec![category];
        categories.extend(dependency_graph::dependents_of(category)?);
        let reports = self.derive_in(dam, &mut workspace, &categories).await?;
        self.persist(&mut workspace).await?;

        let stored = workspace
            .snapshots
            .remove(&category)
            .ok_or_else(|| EngineError::snapshot_not_found(dam.id, category))?;
        Ok((stored, reports))
    }

    async fn load(&self, dam_id: i64) -> Result<Workspace, EngineError> {
        let snapshots = self
            .snapshots
            .list_for_dam(dam_id)
            .await?
            .into_iter()
            .map(|s| (s.category, s))
            .collect();
        Ok(Workspace {
            snapshots,
            dirty: BTreeSet::new(),
            basin: None,
        })
    }

    /// Derive `categories` in dependency order against the workspace, so each
    /// dependent sees the values derived just before it.
    async fn derive_in(
        &self,
        dam: &Dam,
        workspace: &mut Workspace,
        categories: &[Category],
    ) -> Result<Vec<RecomputeReport>, EngineError> {
        let mut reports = Vec::with_capacity(categories.len());
        for category in dependency_graph::topological_order(categories)? {
            if !workspace.snapshots.contains_key(&category) {
                debug!(dam_id = dam.id, category = %category, "No snapshot, skipping");
                continue;
            }
            let (cross, dependency_revisions) =
                self.cross_entity_inputs(dam, category, workspace).await?;
            let Some(snapshot) = workspace.snapshots.get(&category) else {
                continue;
            };

            let derivation =
                derivation::derive_snapshot(category, &snapshot.inputs, &snapshot.derived, &cross)?;
            log_notes(dam.id, category, &derivation.notes);

            let basin_context = match category {
                Category::BasinAggregated => cross.basin,
                _ => None,
            };
            let changed = derivation.derived != snapshot.derived
                || snapshot.computed_revision != Some(snapshot.input_revision)
                || snapshot.dependency_revisions != dependency_revisions
                || snapshot.basin_context != basin_context;

            if changed {
                let next = StoredSnapshot {
                    derived: derivation.derived,
                    computed_revision: Some(snapshot.input_revision),
                    dependency_revisions,
                    basin_context,
                    ..snapshot.clone()
                };
                workspace.stage(next);
            } else {
                debug!(dam_id = dam.id, category = %category, "Derived fields unchanged");
            }

            reports.push(RecomputeReport {
                dam_id: dam.id,
                category,
                changed,
                notes: derivation.notes,
            });
        }
        Ok(reports)
    }

    /// Store every staged snapshot in one atomic upsert.
    async fn persist(&self, workspace: &mut Workspace) -> Result<(), EngineError> {
        if workspace.dirty.is_empty() {
            return Ok(());
        }
        let pending: Vec<StoredSnapshot> = workspace
            .dirty
            .iter()
            .filter_map(|category| workspace.snapshots.get(category).cloned())
            .collect();

        let stored = self.snapshots.upsert_many(&pending).await?;
        debug!(snapshots = stored.len(), "Derived fields stored");
        for snapshot in stored {
            workspace.snapshots.insert(snapshot.category, snapshot);
        }
        workspace.dirty.clear();
        Ok(())
    }

    async fn basin_context(
        &self,
        dam_id: i64,
        workspace: &mut Workspace,
    ) -> Result<BasinContext, EngineError> {
        if let Some(basin) = &workspace.basin {
            return Ok(basin.clone());
        }
        let basin = self.dam_service.basin_context(dam_id).await?;
        workspace.basin = Some(basin.clone());
        Ok(basin)
    }

    async fn cross_entity_inputs(
        &self,
        dam: &Dam,
        category: Category,
        workspace: &mut Workspace,
    ) -> Result<(CrossEntityInputs, BTreeMap<Category, i64>), EngineError> {
        let mut cross = CrossEntityInputs::default();
        for upstream in dependency_graph::upstreams_of(category) {
            let Some(snapshot) = workspace.snapshots.get(&upstream) else {
                continue;
            };
            match upstream {
                Category::StructuralHealth => {
                    cross.structural_health = Some(serde_json::from_value(snapshot.derived.clone())?);
                }
                Category::PredictiveSimulation => {
                    cross.predictive_simulation =
                        Some(serde_json::from_value(snapshot.derived.clone())?);
                }
                _ => {}
            }
        }

        match category {
            Category::BasinAggregated => {
                cross.basin = Some(self.basin_context(dam.id, workspace).await?);
            }
            Category::DamStatus => cross.links = Some(DamLinks::of(dam)),
            _ => {}
        }

        Ok((cross, workspace.upstream_revisions(category)))
    }
}

/// One dam's snapshots, loaded under the dam lock. Derivations update this
/// copy; `dirty` marks what still has to be stored.
struct Workspace {
    snapshots: BTreeMap<Category, StoredSnapshot>,
    dirty: BTreeSet<Category>,
    basin: Option<BasinContext>,
}

impl Workspace {
    fn stage(&mut self, snapshot: StoredSnapshot) {
        self.dirty.insert(snapshot.category);
        self.snapshots.insert(snapshot.category, snapshot);
    }

    /// Input revisions of the upstream snapshots `category` reads.
    fn upstream_revisions(&self, category: Category) -> BTreeMap<Category, i64> {
        dependency_graph::upstreams_of(category)
            .into_iter()
            .filter_map(|u| self.snapshots.get(&u).map(|s| (u, s.input_revision)))
            .collect()
    }
}

fn log_notes(dam_id: i64, category: Category, notes: &[DerivationNote]) {
    for note in notes {
        match note {
            DerivationNote::ComputationSkipped { field } => {
                debug!(dam_id, category = %category, field = %field, "Computation skipped, input missing");
            }
            DerivationNote::StaleDependency { upstream, field } => {
                warn!(
                    dam_id,
                    category = %category,
                    upstream = %upstream,
                    field = %field,
                    "Upstream snapshot missing, keeping previous value"
                );
            }
        }
    }
}
