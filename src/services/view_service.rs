use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::classification::{self, AlertLevel, Axis, Classification, EmergencyLevel};
use crate::db::{Category, SnapshotRepository, StoredSnapshot};
use crate::derivation::{AlertFlags, SafetyAlertDerived, SafetyAlertInputs};
use crate::error::EngineError;
use crate::services::dam_service::DamService;
use crate::views::{self, Audience, AudienceView};

/// Query for [`ViewService::list_active_alerts`].
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlertFilter {
    /// Minimum flood risk score; defaults to the configured threshold.
    pub min_score: Option<f64>,
    /// Also include dams with any alert flag raised, whatever their score.
    /// On unless set to false.
    #[serde(default = "default_include_flagged")]
    pub include_flagged: bool,
}

fn default_include_flagged() -> bool {
    true
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            min_score: None,
            include_flagged: default_include_flagged(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    pub dam_id: i64,
    pub flood_risk_score: Option<f64>,
    pub emergency_level: Option<EmergencyLevel>,
    pub alert_level: Option<AlertLevel>,
    pub alerts: AlertFlags,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResponse {
    pub axis: Axis,
    pub score: f64,
    pub state: String,
    /// 0 is the least severe state on the axis.
    pub severity: u8,
}

impl ClassificationResponse {
    fn new(axis: Axis, score: f64, classification: Classification) -> Self {
        Self {
            axis,
            score,
            state: classification.label().to_string(),
            severity: classification.severity(),
        }
    }
}

#[derive(Clone)]
pub struct ViewService {
    snapshots: Arc<dyn SnapshotRepository>,
    dam_service: DamService,
    default_min_score: f64,
}

impl ViewService {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        dam_service: DamService,
        default_min_score: f64,
    ) -> Self {
        Self {
            snapshots,
            dam_service,
            default_min_score,
        }
    }

    #[instrument(skip(self), fields(dam_id = %dam_id, audience = %audience))]
    pub async fn get_view(&self, dam_id: i64, audience: Audience) -> Result<AudienceView, EngineError> {
        self.dam_service.get_dam(dam_id).await?;
        let snapshot = self
            .snapshots
            .get(Category::SafetyAlert, dam_id)
            .await?
            .ok_or_else(|| EngineError::snapshot_not_found(dam_id, Category::SafetyAlert))?;

        let inputs: SafetyAlertInputs = serde_json::from_value(snapshot.inputs)?;
        let derived: SafetyAlertDerived = serde_json::from_value(snapshot.derived)?;
        debug!("Projecting safety assessment");
        Ok(views::project(audience, dam_id, &inputs, &derived))
    }

    /// Dams whose flood risk score reaches the threshold, or with any flag
    /// raised unless `include_flagged` is off. Highest score first.
    ///
    /// Snapshots whose derived block cannot be read are logged and skipped.
    #[instrument(skip(self))]
    pub async fn list_active_alerts(
        &self,
        filter: &AlertFilter,
    ) -> Result<Vec<ActiveAlert>, EngineError> {
        let min_score = filter.min_score.unwrap_or(self.default_min_score);
        if !min_score.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "min_score must be a finite number, got {min_score}"
            )));
        }
        let include_flagged = filter.include_flagged;

        let is_active = move |snapshot: &StoredSnapshot| {
            match serde_json::from_value::<SafetyAlertDerived>(snapshot.derived.clone()) {
                Ok(derived) => matches_filter(&derived, min_score, include_flagged),
                Err(e) => {
                    warn!(
                        dam_id = snapshot.dam_id,
                        error = %e,
                        "Skipping unreadable SafetyAlert snapshot"
                    );
                    false
                }
            }
        };
        let matched = self
            .snapshots
            .list_by_filter(Category::SafetyAlert, &is_active)
            .await?;

        let mut alerts = matched
            .into_iter()
            .map(|snapshot| -> Result<ActiveAlert, EngineError> {
                let derived: SafetyAlertDerived = serde_json::from_value(snapshot.derived)?;
                Ok(ActiveAlert {
                    dam_id: snapshot.dam_id,
                    flood_risk_score: derived.flood_risk_score,
                    emergency_level: derived.emergency_level,
                    alert_level: derived.alert_level,
                    alerts: derived.alerts,
                    updated_at: snapshot.updated_at,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        alerts.sort_by(|a, b| {
            b.flood_risk_score
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.flood_risk_score.unwrap_or(f64::NEG_INFINITY))
                .then(a.dam_id.cmp(&b.dam_id))
        });

        debug!(count = alerts.len(), min_score, "Active alerts listed");
        Ok(alerts)
    }

    pub fn classify(&self, score: f64, axis: Axis) -> Result<ClassificationResponse, EngineError> {
        let classification = classification::classify(score, axis)?;
        Ok(ClassificationResponse::new(axis, score, classification))
    }
}

fn matches_filter(derived: &SafetyAlertDerived, min_score: f64, include_flagged: bool) -> bool {
    derived
        .flood_risk_score
        .is_some_and(|score| score >= min_score)
        || (include_flagged && derived.alerts.any())
}
