use serde::{Deserialize, Serialize};

use crate::db::Category;
use crate::derivation::{
    check_finite, check_non_negative, CrossEntityInputs, DerivationNotes, DerivationUnit,
    Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PredictiveSimulationInputs {
    pub current_water_level: Option<f64>,
    pub inflow_rate: Option<f64>,
    pub outflow_rate: Option<f64>,
    /// Added to `inflowRate` when set.
    pub upstream_release_inflow: Option<f64>,
    /// Added to `inflowRate` when set.
    pub lateral_inflow: Option<f64>,
    pub max_capacity: Option<f64>,
    pub current_storage: Option<f64>,
}

impl Validate for PredictiveSimulationInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_finite("currentWaterLevel", self.current_water_level)?;
        check_non_negative("inflowRate", self.inflow_rate)?;
        check_non_negative("outflowRate", self.outflow_rate)?;
        check_non_negative("upstreamReleaseInflow", self.upstream_release_inflow)?;
        check_non_negative("lateralInflow", self.lateral_inflow)?;
        check_non_negative("maxCapacity", self.max_capacity)?;
        check_non_negative("currentStorage", self.current_storage)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictiveSimulationDerived {
    pub net_inflow_rate: Option<f64>,
    pub total_inflow: Option<f64>,
    #[serde(rename = "predictedWaterLevel6h")]
    pub predicted_water_level_6h: Option<f64>,
    #[serde(rename = "predictedWaterLevel12h")]
    pub predicted_water_level_12h: Option<f64>,
    #[serde(rename = "predictedWaterLevel24h")]
    pub predicted_water_level_24h: Option<f64>,
    pub available_storage: Option<f64>,
    pub time_to_full_capacity: Option<f64>,
}

pub struct PredictiveSimulation;

impl DerivationUnit for PredictiveSimulation {
    const CATEGORY: Category = Category::PredictiveSimulation;
    type Inputs = PredictiveSimulationInputs;
    type Derived = PredictiveSimulationDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        _cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();

        let net = inputs
            .inflow_rate
            .zip(inputs.outflow_rate)
            .map(|(inflow, outflow)| formulas::net_inflow(inflow, outflow));
        notes.assign("netInflowRate", &mut next.net_inflow_rate, net);
        notes.assign(
            "totalInflow",
            &mut next.total_inflow,
            inputs.inflow_rate.map(|inflow| {
                inflow
                    + inputs.upstream_release_inflow.unwrap_or(0.0)
                    + inputs.lateral_inflow.unwrap_or(0.0)
            }),
        );

        let level_and_net = inputs.current_water_level.zip(net);
        let predict = |hours: f64| {
            level_and_net.map(|(level, net)| formulas::predicted_water_level(level, net, hours))
        };
        notes.assign(
            "predictedWaterLevel6h",
            &mut next.predicted_water_level_6h,
            predict(6.0),
        );
        notes.assign(
            "predictedWaterLevel12h",
            &mut next.predicted_water_level_12h,
            predict(12.0),
        );
        notes.assign(
            "predictedWaterLevel24h",
            &mut next.predicted_water_level_24h,
            predict(24.0),
        );

        let available = inputs
            .max_capacity
            .zip(inputs.current_storage)
            .map(|(max, current)| formulas::available_storage(max, current));
        notes.assign("availableStorage", &mut next.available_storage, available);
        notes.assign(
            "timeToFullCapacity",
            &mut next.time_to_full_capacity,
            available
                .zip(net)
                .map(|(available, net)| formulas::time_to_full_capacity(available, net)),
        );

        next
    }
}
