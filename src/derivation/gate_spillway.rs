use serde::{Deserialize, Serialize};

use crate::db::Category;
use crate::derivation::{
    check_non_negative, check_range, zip3, CrossEntityInputs, DerivationNotes, DerivationUnit,
    Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GateSpillwayInputs {
    pub number_of_gates: Option<u32>,
    pub gates_open: Option<u32>,
    pub gate_opening_percentage: Option<f64>,
    pub discharge_coefficient: Option<f64>,
    pub head_over_crest: Option<f64>,
    pub spillway_design_capacity: Option<f64>,
    pub current_spillway_discharge: Option<f64>,
}

impl Validate for GateSpillwayInputs {
    fn validate(&self) -> Result<(), EngineError> {
        if let (Some(total), Some(open)) = (self.number_of_gates, self.gates_open) {
            if open > total {
                return Err(EngineError::InvalidInput(format!(
                    "gatesOpen ({open}) exceeds numberOfGates ({total})"
                )));
            }
        }
        check_range("gateOpeningPercentage", self.gate_opening_percentage, 0.0, 100.0)?;
        check_non_negative("dischargeCoefficient", self.discharge_coefficient)?;
        check_non_negative("headOverCrest", self.head_over_crest)?;
        check_non_negative("spillwayDesignCapacity", self.spillway_design_capacity)?;
        check_non_negative("currentSpillwayDischarge", self.current_spillway_discharge)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateSpillwayDerived {
    pub effective_discharge_capacity: Option<f64>,
    pub gate_utilization_percentage: Option<f64>,
    pub spillway_capacity_utilization: Option<f64>,
    /// Total inflow as a percentage of spillway design capacity.
    pub inflow_to_capacity_ratio: Option<f64>,
    pub release_deficit: Option<f64>,
}

pub struct GateSpillway;

impl DerivationUnit for GateSpillway {
    const CATEGORY: Category = Category::GateSpillway;
    type Inputs = GateSpillwayInputs;
    type Derived = GateSpillwayDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();

        notes.assign(
            "effectiveDischargeCapacity",
            &mut next.effective_discharge_capacity,
            zip3(
                inputs.discharge_coefficient,
                inputs.gate_opening_percentage,
                inputs.head_over_crest,
            )
            .map(|(cd, opening, head)| formulas::effective_discharge_capacity(cd, opening, head)),
        );
        notes.assign(
            "gateUtilizationPercentage",
            &mut next.gate_utilization_percentage,
            inputs
                .gates_open
                .zip(inputs.number_of_gates)
                .and_then(|(open, total)| formulas::percentage(f64::from(open), f64::from(total))),
        );
        notes.assign(
            "spillwayCapacityUtilization",
            &mut next.spillway_capacity_utilization,
            inputs
                .current_spillway_discharge
                .zip(inputs.spillway_design_capacity)
                .and_then(|(discharge, design)| formulas::percentage(discharge, design)),
        );

        let Some(simulation) = &cross.predictive_simulation else {
            notes.stale(Category::PredictiveSimulation, "inflowToCapacityRatio");
            notes.stale(Category::PredictiveSimulation, "releaseDeficit");
            return next;
        };
        let total_inflow = simulation.total_inflow;
        notes.assign(
            "inflowToCapacityRatio",
            &mut next.inflow_to_capacity_ratio,
            total_inflow
                .zip(inputs.spillway_design_capacity)
                .and_then(|(inflow, design)| formulas::percentage(inflow, design)),
        );
        notes.assign(
            "releaseDeficit",
            &mut next.release_deficit,
            total_inflow
                .zip(inputs.current_spillway_discharge)
                .map(|(inflow, discharge)| (inflow - discharge).max(0.0)),
        );

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{DerivationNote, PredictiveSimulationDerived};

    fn inputs() -> GateSpillwayInputs {
        GateSpillwayInputs {
            number_of_gates: Some(8),
            gates_open: Some(2),
            gate_opening_percentage: Some(50.0),
            discharge_coefficient: Some(2.0),
            head_over_crest: Some(16.0),
            spillway_design_capacity: Some(1000.0),
            current_spillway_discharge: Some(250.0),
        }
    }

    #[test]
    fn test_gate_fields_with_simulation() {
        let cross = CrossEntityInputs {
            predictive_simulation: Some(PredictiveSimulationDerived {
                total_inflow: Some(400.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut notes = DerivationNotes::default();
        let derived = GateSpillway::derive(
            &inputs(),
            &GateSpillwayDerived::default(),
            &cross,
            &mut notes,
        );

        assert_eq!(derived.effective_discharge_capacity, Some(4.0));
        assert_eq!(derived.gate_utilization_percentage, Some(25.0));
        assert_eq!(derived.spillway_capacity_utilization, Some(25.0));
        assert_eq!(derived.inflow_to_capacity_ratio, Some(40.0));
        assert_eq!(derived.release_deficit, Some(150.0));
        assert!(notes.into_vec().is_empty());
    }

    #[test]
    fn test_missing_simulation_is_stale() {
        let previous = GateSpillwayDerived {
            release_deficit: Some(12.0),
            ..Default::default()
        };
        let mut notes = DerivationNotes::default();
        let derived = GateSpillway::derive(
            &inputs(),
            &previous,
            &CrossEntityInputs::default(),
            &mut notes,
        );

        assert_eq!(derived.release_deficit, Some(12.0));
        assert_eq!(derived.inflow_to_capacity_ratio, None);
        assert_eq!(derived.gate_utilization_percentage, Some(25.0));
        assert!(notes.into_vec().contains(&DerivationNote::StaleDependency {
            upstream: Category::PredictiveSimulation,
            field: "releaseDeficit".to_string(),
        }));
    }

    #[test]
    fn test_more_gates_open_than_installed() {
        let inputs = GateSpillwayInputs {
            number_of_gates: Some(2),
            gates_open: Some(3),
            ..Default::default()
        };
        assert!(matches!(
            inputs.validate(),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_zero_gates_leaves_utilization() {
        let inputs = GateSpillwayInputs {
            number_of_gates: Some(0),
            gates_open: Some(0),
            ..Default::default()
        };
        let mut notes = DerivationNotes::default();
        let derived = GateSpillway::derive(
            &inputs,
            &GateSpillwayDerived::default(),
            &CrossEntityInputs::default(),
            &mut notes,
        );
        assert_eq!(derived.gate_utilization_percentage, None);
    }
}
