use serde::{Deserialize, Serialize};

use crate::classification::MaintenanceUrgency;
use crate::db::Category;
use crate::derivation::{
    check_non_negative, zip4, CrossEntityInputs, DerivationNotes, DerivationUnit, Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StructuralHealthInputs {
    pub crack_width_mm: Option<f64>,
    pub seepage_rate_lpm: Option<f64>,
    pub vibration_level_mms: Option<f64>,
    pub deformation_mm: Option<f64>,
    pub stress_index: Option<f64>,
    pub days_since_last_inspection: Option<f64>,
}

impl Validate for StructuralHealthInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_non_negative("crackWidthMm", self.crack_width_mm)?;
        check_non_negative("seepageRateLpm", self.seepage_rate_lpm)?;
        check_non_negative("vibrationLevelMms", self.vibration_level_mms)?;
        check_non_negative("deformationMm", self.deformation_mm)?;
        check_non_negative("stressIndex", self.stress_index)?;
        check_non_negative("daysSinceLastInspection", self.days_since_last_inspection)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuralHealthDerived {
    /// 100 is a healthy dam.
    pub dam_health_score: Option<f64>,
    pub failure_probability: Option<f64>,
    pub maintenance_urgency: Option<MaintenanceUrgency>,
}

pub struct StructuralHealth;

impl DerivationUnit for StructuralHealth {
    const CATEGORY: Category = Category::StructuralHealth;
    type Inputs = StructuralHealthInputs;
    type Derived = StructuralHealthDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        _cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();

        let health = zip4(
            inputs.crack_width_mm,
            inputs.seepage_rate_lpm,
            inputs.vibration_level_mms,
            inputs.deformation_mm,
        )
        .map(|(crack, seepage, vibration, deformation)| {
            formulas::dam_health_score(crack, seepage, vibration, deformation)
        });
        notes.assign("damHealthScore", &mut next.dam_health_score, health);
        notes.assign(
            "failureProbability",
            &mut next.failure_probability,
            health
                .zip(inputs.stress_index)
                .map(|(health, stress)| formulas::structural_failure_probability(health, stress)),
        );

        let urgency = next
            .dam_health_score
            .zip(inputs.days_since_last_inspection)
            .map(|(health, days)| MaintenanceUrgency::classify(health, days));
        notes.assign("maintenanceUrgency", &mut next.maintenance_urgency, urgency);

        next
    }
}
