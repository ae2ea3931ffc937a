use serde::{Deserialize, Serialize};

use crate::db::Category;
use crate::derivation::{
    check_finite, check_non_negative, zip3, CrossEntityInputs, DerivationNotes, DerivationUnit,
    Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReservoirGeometryInputs {
    pub current_water_level: Option<f64>,
    pub full_reservoir_level: Option<f64>,
    pub min_drawdown_level: Option<f64>,
    pub dead_storage_level: Option<f64>,
    pub surface_area_km2: Option<f64>,
    pub river_width: Option<f64>,
    pub river_depth: Option<f64>,
}

impl Validate for ReservoirGeometryInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_finite("currentWaterLevel", self.current_water_level)?;
        check_finite("fullReservoirLevel", self.full_reservoir_level)?;
        check_finite("minDrawdownLevel", self.min_drawdown_level)?;
        check_finite("deadStorageLevel", self.dead_storage_level)?;
        check_non_negative("surfaceAreaKm2", self.surface_area_km2)?;
        check_non_negative("riverWidth", self.river_width)?;
        check_non_negative("riverDepth", self.river_depth)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReservoirGeometryDerived {
    pub river_cross_section_area: Option<f64>,
    pub hydraulic_radius: Option<f64>,
    pub freeboard: Option<f64>,
    pub live_storage_depth: Option<f64>,
    pub level_fill_percentage: Option<f64>,
}

pub struct ReservoirGeometry;

impl DerivationUnit for ReservoirGeometry {
    const CATEGORY: Category = Category::ReservoirGeometry;
    type Inputs = ReservoirGeometryInputs;
    type Derived = ReservoirGeometryDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        _cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();
        let channel = inputs.river_width.zip(inputs.river_depth);

        notes.assign(
            "riverCrossSectionArea",
            &mut next.river_cross_section_area,
            channel.map(|(w, d)| formulas::cross_section_area(w, d)),
        );
        notes.assign(
            "hydraulicRadius",
            &mut next.hydraulic_radius,
            channel.and_then(|(w, d)| formulas::hydraulic_radius(w, d)),
        );
        notes.assign(
            "freeboard",
            &mut next.freeboard,
            inputs
                .full_reservoir_level
                .zip(inputs.current_water_level)
                .map(|(full, level)| full - level),
        );
        notes.assign(
            "liveStorageDepth",
            &mut next.live_storage_depth,
            inputs
                .current_water_level
                .zip(inputs.min_drawdown_level)
                .map(|(level, mddl)| (level - mddl).max(0.0)),
        );
        notes.assign(
            "levelFillPercentage",
            &mut next.level_fill_percentage,
            zip3(
                inputs.current_water_level,
                inputs.dead_storage_level,
                inputs.full_reservoir_level,
            )
            .and_then(|(level, dead, full)| formulas::level_fill_percentage(level, dead, full)),
        );

        next
    }
}
