//! Threshold tables mapping continuous scores to discrete states.
//!
//! Each axis is independent and non-sticky: the state is recomputed from the
//! current value every time. Tables are evaluated from the most severe state
//! downward and a value equal to a threshold belongs to the more severe state.
//! Every enum derives `Ord` in increasing severity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::EngineError;

/// Operator-facing emergency level, banded on the flood risk score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum EmergencyLevel {
    Normal,
    Watch,
    Warning,
    Critical,
    Disaster,
}

impl EmergencyLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            EmergencyLevel::Disaster
        } else if score >= 70.0 {
            EmergencyLevel::Critical
        } else if score >= 50.0 {
            EmergencyLevel::Warning
        } else if score >= 30.0 {
            EmergencyLevel::Watch
        } else {
            EmergencyLevel::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyLevel::Normal => "Normal",
            EmergencyLevel::Watch => "Watch",
            EmergencyLevel::Warning => "Warning",
            EmergencyLevel::Critical => "Critical",
            EmergencyLevel::Disaster => "Disaster",
        }
    }
}

/// Public-facing alert level. Banded differently from [`EmergencyLevel`]
/// even though both read the same score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum AlertLevel {
    #[serde(rename = "Safe")]
    Safe,
    #[serde(rename = "Be Alert")]
    BeAlert,
    #[serde(rename = "Move To Safer Area")]
    MoveToSaferArea,
    #[serde(rename = "Evacuate Immediately")]
    EvacuateImmediately,
}

impl AlertLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            AlertLevel::EvacuateImmediately
        } else if score >= 60.0 {
            AlertLevel::MoveToSaferArea
        } else if score >= 30.0 {
            AlertLevel::BeAlert
        } else {
            AlertLevel::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Safe => "Safe",
            AlertLevel::BeAlert => "Be Alert",
            AlertLevel::MoveToSaferArea => "Move To Safer Area",
            AlertLevel::EvacuateImmediately => "Evacuate Immediately",
        }
    }

    /// Fixed advisory text shown to the public for this level.
    pub fn advisory(&self) -> &'static str {
        match self {
            AlertLevel::Safe => "No action needed. Conditions at the dam are normal.",
            AlertLevel::BeAlert => {
                "Stay informed and avoid riverbanks downstream of the dam."
            }
            AlertLevel::MoveToSaferArea => {
                "Move people, livestock and valuables to higher ground and await instructions."
            }
            AlertLevel::EvacuateImmediately => {
                "Evacuate now. Follow the instructions of rescue teams and local authorities."
            }
        }
    }
}

/// Red/Yellow/Green zoning used for risk indices.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum RiskZone {
    Green,
    Yellow,
    Red,
}

impl RiskZone {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            RiskZone::Red
        } else if score >= 40.0 {
            RiskZone::Yellow
        } else {
            RiskZone::Green
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskZone::Green => "Green",
            RiskZone::Yellow => "Yellow",
            RiskZone::Red => "Red",
        }
    }
}

/// River stage relative to the published warning and danger levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum DangerLevelStatus {
    Safe,
    Warning,
    Danger,
    Critical,
}

impl DangerLevelStatus {
    /// The warning band starts at 80% of the flood warning level.
    pub fn classify(predicted_level: f64, flood_warning_level: f64, danger_level: f64) -> Self {
        if predicted_level >= danger_level {
            DangerLevelStatus::Critical
        } else if predicted_level >= flood_warning_level {
            DangerLevelStatus::Danger
        } else if predicted_level >= 0.8 * flood_warning_level {
            DangerLevelStatus::Warning
        } else {
            DangerLevelStatus::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DangerLevelStatus::Safe => "Safe",
            DangerLevelStatus::Warning => "Warning",
            DangerLevelStatus::Danger => "Danger",
            DangerLevelStatus::Critical => "Critical",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum MaintenanceUrgency {
    Low,
    Medium,
    High,
    Critical,
}

impl MaintenanceUrgency {
    /// Lower health is more urgent.
    pub fn from_health_score(health_score: f64) -> Self {
        if health_score < 40.0 {
            MaintenanceUrgency::Critical
        } else if health_score < 60.0 {
            MaintenanceUrgency::High
        } else if health_score < 80.0 {
            MaintenanceUrgency::Medium
        } else {
            MaintenanceUrgency::Low
        }
    }

    pub fn from_days_since_inspection(days: f64) -> Self {
        if days >= 365.0 {
            MaintenanceUrgency::Critical
        } else if days >= 180.0 {
            MaintenanceUrgency::High
        } else if days >= 90.0 {
            MaintenanceUrgency::Medium
        } else {
            MaintenanceUrgency::Low
        }
    }

    /// Either signal alone can escalate; the more urgent one wins.
    pub fn classify(health_score: f64, days_since_inspection: f64) -> Self {
        Self::from_health_score(health_score)
            .max(Self::from_days_since_inspection(days_since_inspection))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceUrgency::Low => "Low",
            MaintenanceUrgency::Medium => "Medium",
            MaintenanceUrgency::High => "High",
            MaintenanceUrgency::Critical => "Critical",
        }
    }
}

/// Score-driven axes reachable through [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    EmergencyLevel,
    AlertLevel,
    RiskZone,
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emergencyLevel" | "emergency-level" | "EmergencyLevel" => Ok(Axis::EmergencyLevel),
            "alertLevel" | "alert-level" | "AlertLevel" => Ok(Axis::AlertLevel),
            "riskZone" | "risk-zone" | "RiskZone" => Ok(Axis::RiskZone),
            other => Err(format!("unknown classification axis '{other}'")),
        }
    }
}

/// Result of [`classify`], carrying the typed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Classification {
    EmergencyLevel(EmergencyLevel),
    AlertLevel(AlertLevel),
    RiskZone(RiskZone),
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::EmergencyLevel(level) => level.as_str(),
            Classification::AlertLevel(level) => level.as_str(),
            Classification::RiskZone(zone) => zone.as_str(),
        }
    }

    /// Position on the axis, 0 being the least severe.
    pub fn severity(&self) -> u8 {
        match self {
            Classification::EmergencyLevel(level) => *level as u8,
            Classification::AlertLevel(level) => *level as u8,
            Classification::RiskZone(zone) => *zone as u8,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn classify(score: f64, axis: Axis) -> Result<Classification, EngineError> {
    if !score.is_finite() {
        return Err(EngineError::InvalidInput(format!(
            "score must be a finite number, got {score}"
        )));
    }
    Ok(match axis {
        Axis::EmergencyLevel => Classification::EmergencyLevel(EmergencyLevel::from_score(score)),
        Axis::AlertLevel => Classification::AlertLevel(AlertLevel::from_score(score)),
        Axis::RiskZone => Classification::RiskZone(RiskZone::from_score(score)),
    })
}
