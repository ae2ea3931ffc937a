//! Self-contained safety assessment for one dam.
//!
//! Every audience view is projected from this block. It carries its own water
//! balance and reads no other snapshot.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::classification::{AlertLevel, EmergencyLevel};
use crate::db::Category;
use crate::derivation::{
    check_finite, check_non_negative, check_range, zip4, CrossEntityInputs, DerivationNotes,
    DerivationUnit, Validate,
};
use crate::error::EngineError;
use crate::formulas;

const CRITICAL_GATE_ACTION_HOURS: f64 = 2.0;
const EVACUATION_SCORE: f64 = 80.0;
const STRUCTURAL_INSPECTION_PROBABILITY: f64 = 30.0;
const DOWNSTREAM_WARNING_HOURS: f64 = 6.0;
const DOWNSTREAM_WARNING_SCORE: f64 = 50.0;
const HIGH_INFLOW_RATE: f64 = 500.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SafetyAlertInputs {
    pub current_water_level: Option<f64>,
    pub full_reservoir_level: Option<f64>,
    pub max_capacity: Option<f64>,
    pub current_storage: Option<f64>,
    pub inflow_rate: Option<f64>,
    pub outflow_rate: Option<f64>,
    pub structural_health_score: Option<f64>,
    pub structural_stress_index: Option<f64>,
    pub forecast_rainfall: Option<f64>,
    pub downstream_distance_km: Option<f64>,
    pub downstream_velocity: Option<f64>,
}

impl Validate for SafetyAlertInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_finite("currentWaterLevel", self.current_water_level)?;
        check_finite("fullReservoirLevel", self.full_reservoir_level)?;
        check_non_negative("maxCapacity", self.max_capacity)?;
        check_non_negative("currentStorage", self.current_storage)?;
        check_non_negative("inflowRate", self.inflow_rate)?;
        check_non_negative("outflowRate", self.outflow_rate)?;
        check_range("structuralHealthScore", self.structural_health_score, 0.0, 100.0)?;
        check_non_negative("structuralStressIndex", self.structural_stress_index)?;
        check_non_negative("forecastRainfall", self.forecast_rainfall)?;
        check_non_negative("downstreamDistanceKm", self.downstream_distance_km)?;
        check_non_negative("downstreamVelocity", self.downstream_velocity)
    }
}

/// Boolean alert predicates over the numeric safety fields.
///
/// A predicate whose operand is unset is false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertFlags {
    pub critical_gate_action_required: bool,
    pub evacuation_required: bool,
    pub structural_inspection_required: bool,
    pub downstream_warning_required: bool,
    pub high_inflow_warning: bool,
    pub overtopping_risk: bool,
}

impl AlertFlags {
    pub fn evaluate(derived: &SafetyAlertDerived) -> Self {
        let score = derived.flood_risk_score;
        let above = |value: Option<f64>, threshold: f64| value.is_some_and(|v| v >= threshold);

        Self {
            critical_gate_action_required: derived
                .time_to_full_capacity
                .is_some_and(|hours| hours < CRITICAL_GATE_ACTION_HOURS),
            evacuation_required: above(score, EVACUATION_SCORE),
            structural_inspection_required: above(
                derived.structural_failure_probability,
                STRUCTURAL_INSPECTION_PROBABILITY,
            ),
            downstream_warning_required: derived
                .flood_arrival_time
                .is_some_and(|hours| hours > 0.0 && hours < DOWNSTREAM_WARNING_HOURS)
                && above(score, DOWNSTREAM_WARNING_SCORE),
            high_inflow_warning: derived
                .net_inflow_rate
                .is_some_and(|rate| rate > HIGH_INFLOW_RATE),
            overtopping_risk: derived.freeboard_at_24h.is_some_and(|freeboard| freeboard <= 0.0),
        }
    }

    pub fn any(&self) -> bool {
        self.critical_gate_action_required
            || self.evacuation_required
            || self.structural_inspection_required
            || self.downstream_warning_required
            || self.high_inflow_warning
            || self.overtopping_risk
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SafetyAlertDerived {
    pub net_inflow_rate: Option<f64>,
    pub available_storage: Option<f64>,
    pub time_to_full_capacity: Option<f64>,
    #[serde(rename = "predictedWaterLevel6h")]
    pub predicted_water_level_6h: Option<f64>,
    #[serde(rename = "predictedWaterLevel12h")]
    pub predicted_water_level_12h: Option<f64>,
    #[serde(rename = "predictedWaterLevel24h")]
    pub predicted_water_level_24h: Option<f64>,
    #[serde(rename = "freeboardAt24h")]
    pub freeboard_at_24h: Option<f64>,
    pub flood_arrival_time: Option<f64>,
    pub flood_risk_score: Option<f64>,
    pub structural_failure_probability: Option<f64>,
    pub emergency_level: Option<EmergencyLevel>,
    pub alert_level: Option<AlertLevel>,
    pub alerts: AlertFlags,
}

pub struct SafetyAlert;

impl DerivationUnit for SafetyAlert {
    const CATEGORY: Category = Category::SafetyAlert;
    type Inputs = SafetyAlertInputs;
    type Derived = SafetyAlertDerived;

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

        let level_and_net = inputs.current_water_level.zip(net);
        let predict = |hours: f64| {
            level_and_net.map(|(level, net)| formulas::predicted_water_level(level, net, hours))
        };
        let level_24h = predict(24.0);
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
            level_24h,
        );
        notes.assign(
            "freeboardAt24h",
            &mut next.freeboard_at_24h,
            inputs
                .full_reservoir_level
                .zip(level_24h)
                .map(|(full, predicted)| full - predicted),
        );

        notes.assign(
            "floodArrivalTime",
            &mut next.flood_arrival_time,
            inputs
                .downstream_distance_km
                .zip(inputs.downstream_velocity)
                .map(|(distance, velocity)| formulas::flood_arrival_time(distance, velocity)),
        );
        notes.assign(
            "floodRiskScore",
            &mut next.flood_risk_score,
            zip4(
                inputs.current_storage,
                inputs.max_capacity,
                net,
                inputs.forecast_rainfall,
            )
            .and_then(|(current, max, net, rain)| {
                formulas::flood_risk_score(current, max, net, rain)
            }),
        );
        notes.assign(
            "structuralFailureProbability",
            &mut next.structural_failure_probability,
            inputs
                .structural_health_score
                .zip(inputs.structural_stress_index)
                .map(|(health, stress)| formulas::structural_failure_probability(health, stress)),
        );

        let emergency = next.flood_risk_score.map(EmergencyLevel::from_score);
        let alert = next.flood_risk_score.map(AlertLevel::from_score);
        notes.assign("emergencyLevel", &mut next.emergency_level, emergency);
        notes.assign("alertLevel", &mut next.alert_level, alert);
        next.alerts = AlertFlags::evaluate(&next);

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::DerivationNote;

    fn scenario() -> SafetyAlertInputs {
        SafetyAlertInputs {
            current_water_level: Some(120.0),
            full_reservoir_level: Some(125.0),
            max_capacity: Some(100_000.0),
            current_storage: Some(99_000.0),
            inflow_rate: Some(300.0),
            outflow_rate: Some(200.0),
            structural_health_score: Some(70.0),
            structural_stress_index: Some(0.5),
            forecast_rainfall: Some(80.0),
            downstream_distance_km: Some(36.0),
            downstream_velocity: Some(2.0),
        }
    }

    fn derive(inputs: &SafetyAlertInputs, previous: &SafetyAlertDerived) -> SafetyAlertDerived {
        let mut notes = DerivationNotes::default();
        SafetyAlert::derive(inputs, previous, &CrossEntityInputs::default(), &mut notes)
    }

    #[test]
    fn test_near_full_reservoir_scenario() {
        let derived = derive(&scenario(), &SafetyAlertDerived::default());

        assert_eq!(derived.net_inflow_rate, Some(100.0));
        assert_eq!(derived.available_storage, Some(1000.0));
        assert!(derived.time_to_full_capacity.unwrap() < 2.0);
        assert!((derived.flood_risk_score.unwrap() - 66.6).abs() < 1e-9);
        assert_eq!(derived.emergency_level, Some(EmergencyLevel::Warning));
        assert_eq!(derived.alert_level, Some(AlertLevel::MoveToSaferArea));
        assert!((derived.freeboard_at_24h.unwrap() - 2.6).abs() < 1e-9);
        assert!((derived.flood_arrival_time.unwrap() - 5.0).abs() < 1e-9);
        assert!((derived.structural_failure_probability.unwrap() - 45.0).abs() < 1e-9);

        let flags = derived.alerts;
        assert!(flags.critical_gate_action_required);
        assert!(!flags.evacuation_required);
        assert!(flags.structural_inspection_required);
        assert!(flags.downstream_warning_required);
        assert!(!flags.high_inflow_warning);
        assert!(!flags.overtopping_risk);
        assert!(flags.any());
    }

    #[test]
    fn test_unset_operands_raise_no_flags() {
        let flags = AlertFlags::evaluate(&SafetyAlertDerived::default());
        assert_eq!(flags, AlertFlags::default());
        assert!(!flags.any());
    }

    #[test]
    fn test_overtopping_and_high_inflow() {
        let derived = SafetyAlertDerived {
            net_inflow_rate: Some(600.0),
            freeboard_at_24h: Some(0.0),
            ..Default::default()
        };
        let flags = AlertFlags::evaluate(&derived);
        assert!(flags.high_inflow_warning);
        assert!(flags.overtopping_risk);
    }

    #[test]
    fn test_zero_arrival_time_does_not_warn_downstream() {
        let derived = SafetyAlertDerived {
            flood_arrival_time: Some(0.0),
            flood_risk_score: Some(95.0),
            ..Default::default()
        };
        let flags = AlertFlags::evaluate(&derived);
        assert!(!flags.downstream_warning_required);
        assert!(flags.evacuation_required);
    }

    #[test]
    fn test_partial_inputs_keep_previous_score() {
        let previous = derive(&scenario(), &SafetyAlertDerived::default());
        let inputs = SafetyAlertInputs {
            forecast_rainfall: None,
            ..scenario()
        };
        let mut notes = DerivationNotes::default();
        let derived = SafetyAlert::derive(
            &inputs,
            &previous,
            &CrossEntityInputs::default(),
            &mut notes,
        );

        assert_eq!(derived.flood_risk_score, previous.flood_risk_score);
        assert_eq!(derived.alert_level, previous.alert_level);
        assert_eq!(
            notes.into_vec(),
            vec![DerivationNote::ComputationSkipped {
                field: "floodRiskScore".to_string()
            }]
        );
    }

    #[test]
    fn test_rederiving_is_idempotent() {
        let first = derive(&scenario(), &SafetyAlertDerived::default());
        let second = derive(&scenario(), &first);
        assert_eq!(first, second);
    }

    #[test]
    fn test_wire_names() {
        let derived = derive(&scenario(), &SafetyAlertDerived::default());
        let json = serde_json::to_value(&derived).unwrap();
        assert_eq!(json["alertLevel"], "Move To Safer Area");
        assert_eq!(json["emergencyLevel"], "Warning");
        assert_eq!(json["alerts"]["criticalGateActionRequired"], true);
        assert!(json.get("freeboardAt24h").is_some());
    }
}
