//! Audience-specific projections of a dam's safety assessment.
//!
//! Views are read-only and computed on request from the `SafetyAlert`
//! snapshot. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::classification::{AlertLevel, EmergencyLevel};
use crate::derivation::{SafetyAlertDerived, SafetyAlertInputs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Controller,
    Government,
    Rescue,
    Public,
}

impl Audience {
    pub const ALL: [Audience; 4] = [
        Audience::Controller,
        Audience::Government,
        Audience::Rescue,
        Audience::Public,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Controller => "controller",
            Audience::Government => "government",
            Audience::Rescue => "rescue",
            Audience::Public => "public",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Audience::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown audience '{s}'"))
    }
}

/// Dam control room: the full water balance and gate-related flags.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerView {
    pub dam_id: i64,
    pub current_water_level: Option<f64>,
    pub full_reservoir_level: Option<f64>,
    pub current_storage: Option<f64>,
    pub max_capacity: Option<f64>,
    pub inflow_rate: Option<f64>,
    pub outflow_rate: Option<f64>,
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
    pub flood_risk_score: Option<f64>,
    pub emergency_level: Option<EmergencyLevel>,
    pub critical_gate_action_required: bool,
    pub high_inflow_warning: bool,
    pub overtopping_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GovernmentView {
    pub dam_id: i64,
    pub flood_risk_score: Option<f64>,
    pub emergency_level: Option<EmergencyLevel>,
    pub alert_level: Option<AlertLevel>,
    pub structural_failure_probability: Option<f64>,
    pub flood_arrival_time: Option<f64>,
    pub time_to_full_capacity: Option<f64>,
    pub evacuation_required: bool,
    pub structural_inspection_required: bool,
    pub downstream_warning_required: bool,
    pub overtopping_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescueView {
    pub dam_id: i64,
    pub alert_level: Option<AlertLevel>,
    pub emergency_level: Option<EmergencyLevel>,
    pub flood_arrival_time: Option<f64>,
    pub downstream_distance_km: Option<f64>,
    pub downstream_velocity: Option<f64>,
    #[serde(rename = "predictedWaterLevel24h")]
    pub predicted_water_level_24h: Option<f64>,
    pub evacuation_required: bool,
    pub downstream_warning_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicView {
    pub dam_id: i64,
    pub alert_level: Option<AlertLevel>,
    pub advisory: String,
    pub flood_arrival_time: Option<f64>,
    pub evacuation_required: bool,
}

/// One projection, tagged with the audience it was built for.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "audience", rename_all = "lowercase")]
pub enum AudienceView {
    Controller(ControllerView),
    Government(GovernmentView),
    Rescue(RescueView),
    Public(PublicView),
}

const NO_ASSESSMENT_ADVISORY: &str = "No assessment is available for this dam yet.";

pub fn project(
    audience: Audience,
    dam_id: i64,
    inputs: &SafetyAlertInputs,
    derived: &SafetyAlertDerived,
) -> AudienceView {
    let flags = &derived.alerts;
    match audience {
        Audience::Controller => AudienceView::Controller(ControllerView {
            dam_id,
            current_water_level: inputs.current_water_level,
            full_reservoir_level: inputs.full_reservoir_level,
            current_storage: inputs.current_storage,
            max_capacity: inputs.max_capacity,
            inflow_rate: inputs.inflow_rate,
            outflow_rate: inputs.outflow_rate,
            net_inflow_rate: derived.net_inflow_rate,
            available_storage: derived.available_storage,
            time_to_full_capacity: derived.time_to_full_capacity,
            predicted_water_level_6h: derived.predicted_water_level_6h,
            predicted_water_level_12h: derived.predicted_water_level_12h,
            predicted_water_level_24h: derived.predicted_water_level_24h,
            freeboard_at_24h: derived.freeboard_at_24h,
            flood_risk_score: derived.flood_risk_score,
            emergency_level: derived.emergency_level,
            critical_gate_action_required: flags.critical_gate_action_required,
            high_inflow_warning: flags.high_inflow_warning,
            overtopping_risk: flags.overtopping_risk,
        }),
        Audience::Government => AudienceView::Government(GovernmentView {
            dam_id,
            flood_risk_score: derived.flood_risk_score,
            emergency_level: derived.emergency_level,
            alert_level: derived.alert_level,
            structural_failure_probability: derived.structural_failure_probability,
            flood_arrival_time: derived.flood_arrival_time,
            time_to_full_capacity: derived.time_to_full_capacity,
            evacuation_required: flags.evacuation_required,
            structural_inspection_required: flags.structural_inspection_required,
            downstream_warning_required: flags.downstream_warning_required,
            overtopping_risk: flags.overtopping_risk,
        }),
        Audience::Rescue => AudienceView::Rescue(RescueView {
            dam_id,
            alert_level: derived.alert_level,
            emergency_level: derived.emergency_level,
            flood_arrival_time: derived.flood_arrival_time,
            downstream_distance_km: inputs.downstream_distance_km,
            downstream_velocity: inputs.downstream_velocity,
            predicted_water_level_24h: derived.predicted_water_level_24h,
            evacuation_required: flags.evacuation_required,
            downstream_warning_required: flags.downstream_warning_required,
        }),
        Audience::Public => AudienceView::Public(PublicView {
            dam_id,
            alert_level: derived.alert_level,
            advisory: derived
                .alert_level
                .map(|level| level.advisory())
                .unwrap_or(NO_ASSESSMENT_ADVISORY)
                .to_string(),
            flood_arrival_time: derived.flood_arrival_time,
            evacuation_required: flags.evacuation_required,
        }),
    }
}
