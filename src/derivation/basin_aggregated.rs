use serde::{Deserialize, Serialize};

use crate::classification::RiskZone;
use crate::db::Category;
use crate::derivation::{
    check_non_negative, check_range, zip3, CrossEntityInputs, DerivationNotes, DerivationUnit,
    Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BasinAggregatedInputs {
    /// 0..=1
    pub upstream_stress: Option<f64>,
    /// 0..=1
    pub downstream_stress: Option<f64>,
    pub basin_storage: Option<f64>,
    pub basin_capacity: Option<f64>,
}

impl Validate for BasinAggregatedInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_range("upstreamStress", self.upstream_stress, 0.0, 1.0)?;
        check_range("downstreamStress", self.downstream_stress, 0.0, 1.0)?;
        check_non_negative("basinStorage", self.basin_storage)?;
        check_non_negative("basinCapacity", self.basin_capacity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasinAggregatedDerived {
    pub basin_storage_utilization: Option<f64>,
    pub cascading_failure_probability: Option<f64>,
    pub basin_risk_zone: Option<RiskZone>,
    pub dams_in_basin: Option<u32>,
    pub nearest_upstream_distance_km: Option<f64>,
    pub nearest_downstream_distance_km: Option<f64>,
}

pub struct BasinAggregated;

impl DerivationUnit for BasinAggregated {
    const CATEGORY: Category = Category::BasinAggregated;
    type Inputs = BasinAggregatedInputs;
    type Derived = BasinAggregatedDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();

        notes.assign(
            "basinStorageUtilization",
            &mut next.basin_storage_utilization,
            inputs
                .basin_storage
                .zip(inputs.basin_capacity)
                .and_then(|(storage, capacity)| formulas::storage_utilization(storage, capacity)),
        );

        match &cross.structural_health {
            Some(health) => notes.assign(
                "cascadingFailureProbability",
                &mut next.cascading_failure_probability,
                zip3(
                    inputs.upstream_stress,
                    inputs.downstream_stress,
                    health.dam_health_score,
                )
                .map(|(up, down, health)| {
                    formulas::cascading_failure_probability(up, down, health)
                }),
            ),
            None => notes.stale(Category::StructuralHealth, "cascadingFailureProbability"),
        }

        let zone = next.cascading_failure_probability.map(RiskZone::from_score);
        notes.assign("basinRiskZone", &mut next.basin_risk_zone, zone);

        // Basin context comes from dam links; distances stay unset for an
        // end-of-chain dam.
        if let Some(basin) = &cross.basin {
            next.dams_in_basin = Some(u32::try_from(basin.dams_in_basin).unwrap_or(u32::MAX));
            next.nearest_upstream_distance_km = basin.nearest_upstream_distance_km;
            next.nearest_downstream_distance_km = basin.nearest_downstream_distance_km;
        }

        next
    }
}
