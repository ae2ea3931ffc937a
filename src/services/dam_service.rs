use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::db::{Dam, DamRepository, NewDam};
use crate::derivation::BasinContext;
use crate::error::EngineError;

/// Dams connected to one dam through upstream/downstream links.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BasinSummary {
    pub dam_id: i64,
    pub dams_in_basin: usize,
    pub nearest_upstream_distance_km: Option<f64>,
    pub nearest_downstream_distance_km: Option<f64>,
    pub members: Vec<Dam>,
}

#[derive(Clone)]
pub struct DamService {
    dams: Arc<dyn DamRepository>,
}

impl DamService {
    pub fn new(dams: Arc<dyn DamRepository>) -> Self {
        Self { dams }
    }

    /// Register a dam. Links must name existing dams.
    #[instrument(skip(self, dam), fields(name = %dam.name))]
    pub async fn create_dam(&self, dam: &NewDam) -> Result<Dam, EngineError> {
        if dam.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("name must not be empty".to_string()));
        }
        if dam.upstream_dam_id.is_some() && dam.upstream_dam_id == dam.downstream_dam_id {
            return Err(EngineError::InvalidInput(
                "a dam cannot be both upstream and downstream".to_string(),
            ));
        }
        for (field, value) in [
            ("heightM", dam.height_m),
            ("lengthM", dam.length_m),
            ("grossStorageCapacity", dam.gross_storage_capacity),
            ("liveStorageCapacity", dam.live_storage_capacity),
            ("upstreamDistanceKm", dam.upstream_distance_km),
            ("downstreamDistanceKm", dam.downstream_distance_km),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(EngineError::InvalidInput(format!(
                        "{field} must be a non-negative number, got {v}"
                    )));
                }
            }
        }
        for (link, id) in [
            ("upstreamDamId", dam.upstream_dam_id),
            ("downstreamDamId", dam.downstream_dam_id),
        ] {
            if let Some(id) = id {
                if self.dams.find_dam(id).await?.is_none() {
                    return Err(EngineError::InvalidInput(format!(
                        "{link} {id} does not name an existing dam"
                    )));
                }
            }
        }

        let created = self.dams.insert_dam(dam).await?;
        info!(dam_id = created.id, "Dam registered");
        Ok(created)
    }

    pub async fn get_dam(&self, dam_id: i64) -> Result<Dam, EngineError> {
        self.dams
            .find_dam(dam_id)
            .await?
            .ok_or_else(|| EngineError::dam_not_found(dam_id))
    }

    pub async fn list_dams(&self) -> Result<Vec<Dam>, EngineError> {
        Ok(self.dams.list_dams().await?)
    }

    /// Connected component of `dam_id` over links in both directions, sorted
    /// by id. Always contains the dam itself.
    #[instrument(skip(self))]
    pub async fn basin_members(&self, dam_id: i64) -> Result<Vec<Dam>, EngineError> {
        let all = self.dams.list_dams().await?;
        let by_id: HashMap<i64, &Dam> = all.iter().map(|d| (d.id, d)).collect();
        if !by_id.contains_key(&dam_id) {
            return Err(EngineError::dam_not_found(dam_id));
        }

        let mut neighbours: HashMap<i64, Vec<i64>> = HashMap::new();
        for dam in &all {
            for linked in dam.linked_dam_ids() {
                neighbours.entry(dam.id).or_default().push(linked);
                neighbours.entry(linked).or_default().push(dam.id);
            }
        }

        let mut seen = BTreeSet::from([dam_id]);
        let mut queue = VecDeque::from([dam_id]);
        while let Some(current) = queue.pop_front() {
            for next in neighbours.get(&current).into_iter().flatten() {
                if by_id.contains_key(next) && seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        debug!(members = seen.len(), "Resolved basin");

        Ok(seen
            .into_iter()
            .filter_map(|id| by_id.get(&id).map(|d| (*d).clone()))
            .collect())
    }

    pub async fn basin_summary(&self, dam_id: i64) -> Result<BasinSummary, EngineError> {
        let members = self.basin_members(dam_id).await?;
        let context = basin_context_from(dam_id, &members);
        Ok(BasinSummary {
            dam_id,
            dams_in_basin: context.dams_in_basin,
            nearest_upstream_distance_km: context.nearest_upstream_distance_km,
            nearest_downstream_distance_km: context.nearest_downstream_distance_km,
            members,
        })
    }

    /// Basin facts fed into the `BasinAggregated` derivation.
    pub async fn basin_context(&self, dam_id: i64) -> Result<BasinContext, EngineError> {
        let members = self.basin_members(dam_id).await?;
        Ok(basin_context_from(dam_id, &members))
    }
}

/// Links may be recorded on either side, so a dam that names `dam_id` as its
/// downstream neighbour counts as upstream of it and the other way round.
fn basin_context_from(dam_id: i64, members: &[Dam]) -> BasinContext {
    let nearest = |distances: Vec<f64>| distances.into_iter().reduce(f64::min);

    let mut upstream = Vec::new();
    let mut downstream = Vec::new();
    for dam in members {
        if dam.id == dam_id {
            if dam.upstream_dam_id.is_some() {
                upstream.extend(dam.upstream_distance_km);
            }
            if dam.downstream_dam_id.is_some() {
                downstream.extend(dam.downstream_distance_km);
            }
        } else {
            if dam.downstream_dam_id == Some(dam_id) {
                upstream.extend(dam.downstream_distance_km);
            }
            if dam.upstream_dam_id == Some(dam_id) {
                downstream.extend(dam.upstream_distance_km);
            }
        }
    }

    BasinContext {
        dams_in_basin: members.len(),
        nearest_upstream_distance_km: nearest(upstream),
        nearest_downstream_distance_km: nearest(downstream),
    }
}
