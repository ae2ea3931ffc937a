//! Per-category derivation units.
//!
//! A unit maps an immutable input block, the previously derived block and any
//! cross-entity values to a new derived block. Fields whose inputs are missing
//! keep their previous value; this is recorded as a
//! [`DerivationNote::ComputationSkipped`] rather than treated as a failure.
//!
//! Numeric fields are computed from the current inputs only. Classifications
//! and flags are computed from the resulting derived block, so they always
//! agree with the numbers stored next to them.

pub mod basin_aggregated;
pub mod dam_status;
pub mod downstream_risk;
pub mod forecast_meteo;
pub mod gate_spillway;
pub mod historical_risk;
pub mod predictive_simulation;
pub mod reservoir_geometry;
pub mod safety_alert;
pub mod storage_capacity;
pub mod structural_health;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::{Category, Dam};
use crate::error::EngineError;

pub use basin_aggregated::{BasinAggregated, BasinAggregatedDerived, BasinAggregatedInputs};
pub use dam_status::{DamStatus, DamStatusDerived, DamStatusInputs, FlowTrend};
pub use downstream_risk::{DownstreamRisk, DownstreamRiskDerived, DownstreamRiskInputs};
pub use forecast_meteo::{ForecastMeteo, ForecastMeteoDerived, ForecastMeteoInputs};
pub use gate_spillway::{GateSpillway, GateSpillwayDerived, GateSpillwayInputs};
pub use historical_risk::{HistoricalRisk, HistoricalRiskDerived, HistoricalRiskInputs};
pub use predictive_simulation::{
    PredictiveSimulation, PredictiveSimulationDerived, PredictiveSimulationInputs,
};
pub use reservoir_geometry::{
    ReservoirGeometry, ReservoirGeometryDerived, ReservoirGeometryInputs,
};
pub use safety_alert::{AlertFlags, SafetyAlert, SafetyAlertDerived, SafetyAlertInputs};
pub use storage_capacity::{StorageCapacity, StorageCapacityDerived, StorageCapacityInputs};
pub use structural_health::{StructuralHealth, StructuralHealthDerived, StructuralHealthInputs};

/// Why a derived value was not refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DerivationNote {
    /// A required input was unset; the field kept its previous value.
    ComputationSkipped { field: String },
    /// The upstream snapshot does not exist yet for this dam.
    StaleDependency { upstream: Category, field: String },
}

/// Collects notes while a unit runs.
#[derive(Debug, Default)]
pub struct DerivationNotes {
    notes: Vec<DerivationNote>,
}

impl DerivationNotes {
    /// Store `value` in `slot`, or keep the slot and note the skip.
    pub fn assign<T>(&mut self, field: &'static str, slot: &mut Option<T>, value: Option<T>) {
        match value {
            Some(value) => *slot = Some(value),
            None => self.skipped(field),
        }
    }

    pub fn skipped(&mut self, field: &'static str) {
        self.notes.push(DerivationNote::ComputationSkipped {
            field: field.to_string(),
        });
    }

    pub fn stale(&mut self, upstream: Category, field: &'static str) {
        self.notes.push(DerivationNote::StaleDependency {
            upstream,
            field: field.to_string(),
        });
    }

    pub fn into_vec(self) -> Vec<DerivationNote> {
        self.notes
    }
}

/// Values a unit may read from other snapshots of the same dam.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossEntityInputs {
    pub structural_health: Option<StructuralHealthDerived>,
    pub predictive_simulation: Option<PredictiveSimulationDerived>,
    pub basin: Option<BasinContext>,
    pub links: Option<DamLinks>,
}

/// Which river links the dam itself has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamLinks {
    pub has_upstream: bool,
    pub has_downstream: bool,
}

impl DamLinks {
    pub fn of(dam: &Dam) -> Self {
        Self {
            has_upstream: dam.upstream_dam_id.is_some(),
            has_downstream: dam.downstream_dam_id.is_some(),
        }
    }
}

/// Basin facts resolved from dam links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasinContext {
    pub dams_in_basin: usize,
    pub nearest_upstream_distance_km: Option<f64>,
    pub nearest_downstream_distance_km: Option<f64>,
}

pub trait Validate {
    fn validate(&self) -> Result<(), EngineError>;
}

pub trait DerivationUnit {
    const CATEGORY: Category;
    type Inputs: DeserializeOwned + Serialize + Default + Validate;
    type Derived: DeserializeOwned + Serialize + Default + Clone + PartialEq;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived;
}

/// Output of one derivation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub derived: serde_json::Value,
    pub notes: Vec<DerivationNote>,
}

/// Decode and validate an input block without deriving.
pub fn validate_inputs(category: Category, inputs: &serde_json::Value) -> Result<(), EngineError> {
    match category {
        Category::ReservoirGeometry => check::<ReservoirGeometry>(inputs),
        Category::StorageCapacity => check::<StorageCapacity>(inputs),
        Category::ForecastMeteo => check::<ForecastMeteo>(inputs),
        Category::PredictiveSimulation => check::<PredictiveSimulation>(inputs),
        Category::HistoricalRisk => check::<HistoricalRisk>(inputs),
        Category::StructuralHealth => check::<StructuralHealth>(inputs),
        Category::GateSpillway => check::<GateSpillway>(inputs),
        Category::DownstreamRisk => check::<DownstreamRisk>(inputs),
        Category::BasinAggregated => check::<BasinAggregated>(inputs),
        Category::SafetyAlert => check::<SafetyAlert>(inputs),
        Category::DamStatus => check::<DamStatus>(inputs),
    }
}

/// Run the unit for `category` over stored JSON blocks.
pub fn derive_snapshot(
    category: Category,
    inputs: &serde_json::Value,
    previous: &serde_json::Value,
    cross: &CrossEntityInputs,
) -> Result<Derivation, EngineError> {
    match category {
        Category::ReservoirGeometry => run::<ReservoirGeometry>(inputs, previous, cross),
        Category::StorageCapacity => run::<StorageCapacity>(inputs, previous, cross),
        Category::ForecastMeteo => run::<ForecastMeteo>(inputs, previous, cross),
        Category::PredictiveSimulation => run::<PredictiveSimulation>(inputs, previous, cross),
        Category::HistoricalRisk => run::<HistoricalRisk>(inputs, previous, cross),
        Category::StructuralHealth => run::<StructuralHealth>(inputs, previous, cross),
        Category::GateSpillway => run::<GateSpillway>(inputs, previous, cross),
        Category::DownstreamRisk => run::<DownstreamRisk>(inputs, previous, cross),
        Category::BasinAggregated => run::<BasinAggregated>(inputs, previous, cross),
        Category::SafetyAlert => run::<SafetyAlert>(inputs, previous, cross),
        Category::DamStatus => run::<DamStatus>(inputs, previous, cross),
    }
}

fn decode_inputs<U: DerivationUnit>(inputs: &serde_json::Value) -> Result<U::Inputs, EngineError> {
    let inputs: U::Inputs = serde_json::from_value(inputs.clone())
        .map_err(|e| EngineError::InvalidInput(format!("{}: {e}", U::CATEGORY)))?;
    inputs.validate()?;
    Ok(inputs)
}

fn check<U: DerivationUnit>(inputs: &serde_json::Value) -> Result<(), EngineError> {
    decode_inputs::<U>(inputs).map(|_| ())
}

fn run<U: DerivationUnit>(
    inputs: &serde_json::Value,
    previous: &serde_json::Value,
    cross: &CrossEntityInputs,
) -> Result<Derivation, EngineError> {
    let inputs = decode_inputs::<U>(inputs)?;
    let previous: U::Derived = if previous.is_null() {
        U::Derived::default()
    } else {
        serde_json::from_value(previous.clone())?
    };

    let mut notes = DerivationNotes::default();
    let derived = U::derive(&inputs, &previous, cross, &mut notes);

    Ok(Derivation {
        derived: serde_json::to_value(&derived)?,
        notes: notes.into_vec(),
    })
}

pub(crate) fn zip3<A, B, C>(a: Option<A>, b: Option<B>, c: Option<C>) -> Option<(A, B, C)> {
    Some((a?, b?, c?))
}

pub(crate) fn zip4<A, B, C, D>(
    a: Option<A>,
    b: Option<B>,
    c: Option<C>,
    d: Option<D>,
) -> Option<(A, B, C, D)> {
    Some((a?, b?, c?, d?))
}

// Range checks shared by the input blocks. Unset values always pass.

pub(crate) fn check_finite(field: &str, value: Option<f64>) -> Result<(), EngineError> {
    match value {
        Some(v) if !v.is_finite() => Err(EngineError::InvalidInput(format!(
            "{field} must be a finite number"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_non_negative(field: &str, value: Option<f64>) -> Result<(), EngineError> {
    check_finite(field, value)?;
    match value {
        Some(v) if v < 0.0 => Err(EngineError::InvalidInput(format!(
            "{field} must be >= 0, got {v}"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_range(
    field: &str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Result<(), EngineError> {
    check_finite(field, value)?;
    match value {
        Some(v) if v < min || v > max => Err(EngineError::InvalidInput(format!(
            "{field} must be within {min}..={max}, got {v}"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_positive(field: &str, value: Option<f64>) -> Result<(), EngineError> {
    check_finite(field, value)?;
    match value {
        Some(v) if v <= 0.0 => Err(EngineError::InvalidInput(format!(
            "{field} must be > 0, got {v}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assign_keeps_previous_value_when_unset() {
        let mut notes = DerivationNotes::default();
        let mut slot = Some(4.0);

        notes.assign("netInflowRate", &mut slot, None);
        assert_eq!(slot, Some(4.0));

        notes.assign("netInflowRate", &mut slot, Some(9.0));
        assert_eq!(slot, Some(9.0));

        assert_eq!(
            notes.into_vec(),
            vec![DerivationNote::ComputationSkipped {
                field: "netInflowRate".to_string()
            }]
        );
    }

    #[test]
    fn test_derived_fields_are_not_writable() {
        let result = validate_inputs(
            Category::StorageCapacity,
            &json!({ "maxStorage": 10.0, "availableStorage": 3.0 }),
        );
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_wrong_type_is_invalid_input() {
        let result = validate_inputs(Category::SafetyAlert, &json!({ "inflowRate": "fast" }));
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_every_category_accepts_empty_inputs() {
        for category in Category::ALL {
            let derivation = derive_snapshot(
                category,
                &json!({}),
                &serde_json::Value::Null,
                &CrossEntityInputs::default(),
            )
            .unwrap();
            assert!(derivation.derived.is_object(), "{category}");
        }
    }

    #[test]
    fn test_note_serialization() {
        let note = DerivationNote::StaleDependency {
            upstream: Category::StructuralHealth,
            field: "cascadingFailureProbability".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&note).unwrap(),
            json!({
                "kind": "staleDependency",
                "upstream": "StructuralHealth",
                "field": "cascadingFailureProbability"
            })
        );
    }

    #[test]
    fn test_range_checks() {
        assert!(check_non_negative("x", Some(-1.0)).is_err());
        assert!(check_non_negative("x", None).is_ok());
        assert!(check_range("x", Some(101.0), 0.0, 100.0).is_err());
        assert!(check_range("x", Some(f64::NAN), 0.0, 100.0).is_err());
        assert!(check_positive("x", Some(0.0)).is_err());
        assert!(check_positive("x", Some(0.1)).is_ok());
    }
}
