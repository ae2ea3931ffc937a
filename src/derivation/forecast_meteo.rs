use serde::{Deserialize, Serialize};

use crate::classification::RiskZone;
use crate::db::Category;
use crate::derivation::{
    check_non_negative, check_positive, check_range, zip3, CrossEntityInputs, DerivationNotes,
    DerivationUnit, Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForecastMeteoInputs {
    /// mm expected over the forecast window
    pub forecast_rainfall: Option<f64>,
    pub forecast_window_hours: Option<f64>,
    pub catchment_area_km2: Option<f64>,
    pub runoff_coefficient: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
}

impl Validate for ForecastMeteoInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_non_negative("forecastRainfall", self.forecast_rainfall)?;
        check_positive("forecastWindowHours", self.forecast_window_hours)?;
        check_non_negative("catchmentAreaKm2", self.catchment_area_km2)?;
        check_range("runoffCoefficient", self.runoff_coefficient, 0.0, 1.0)?;
        check_non_negative("windSpeedKmh", self.wind_speed_kmh)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForecastMeteoDerived {
    pub expected_runoff_volume: Option<f64>,
    pub expected_inflow_increase: Option<f64>,
    pub rainfall_intensity: Option<f64>,
    pub storm_risk_score: Option<f64>,
    pub risk_zone: Option<RiskZone>,
}

pub struct ForecastMeteo;

impl DerivationUnit for ForecastMeteo {
    const CATEGORY: Category = Category::ForecastMeteo;
    type Inputs = ForecastMeteoInputs;
    type Derived = ForecastMeteoDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        _cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();

        let runoff = zip3(
            inputs.forecast_rainfall,
            inputs.catchment_area_km2,
            inputs.runoff_coefficient,
        )
        .map(|(rain, area, coefficient)| formulas::runoff_volume(rain, area, coefficient));
        notes.assign("expectedRunoffVolume", &mut next.expected_runoff_volume, runoff);
        notes.assign(
            "expectedInflowIncrease",
            &mut next.expected_inflow_increase,
            runoff
                .zip(inputs.forecast_window_hours)
                .and_then(|(volume, hours)| formulas::inflow_increase(volume, hours)),
        );
        notes.assign(
            "rainfallIntensity",
            &mut next.rainfall_intensity,
            inputs
                .forecast_rainfall
                .zip(inputs.forecast_window_hours)
                .and_then(|(rain, hours)| formulas::rainfall_intensity(rain, hours)),
        );
        notes.assign(
            "stormRiskScore",
            &mut next.storm_risk_score,
            inputs
                .forecast_rainfall
                .zip(inputs.wind_speed_kmh)
                .map(|(rain, wind)| formulas::storm_risk_score(rain, wind)),
        );

        let zone = next.storm_risk_score.map(RiskZone::from_score);
        notes.assign("riskZone", &mut next.risk_zone, zone);

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_fields() {
        let inputs = ForecastMeteoInputs {
            forecast_rainfall: Some(48.0),
            forecast_window_hours: Some(24.0),
            catchment_area_km2: Some(100.0),
            runoff_coefficient: Some(0.5),
            wind_speed_kmh: Some(60.0),
        };
        let mut notes = DerivationNotes::default();
        let derived = ForecastMeteo::derive(
            &inputs,
            &ForecastMeteoDerived::default(),
            &CrossEntityInputs::default(),
            &mut notes,
        );

        let volume = derived.expected_runoff_volume.unwrap();
        assert!((volume - 2_400_000.0).abs() < 1e-6);
        let increase = derived.expected_inflow_increase.unwrap();
        assert!((increase - 2_400_000.0 / 86_400.0).abs() < 1e-9);
        assert_eq!(derived.rainfall_intensity, Some(2.0));
        // 0.6 * 48 + 0.8 * 60 = 76.8
        assert!((derived.storm_risk_score.unwrap() - 76.8).abs() < 1e-9);
        assert_eq!(derived.risk_zone, Some(RiskZone::Red));
    }

    #[test]
    fn test_runoff_coefficient_out_of_range() {
        let inputs = ForecastMeteoInputs {
            runoff_coefficient: Some(1.5),
            ..Default::default()
        };
        assert!(inputs.validate().is_err());
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let inputs = ForecastMeteoInputs {
            forecast_window_hours: Some(0.0),
            ..Default::default()
        };
        assert!(inputs.validate().is_err());
    }
}
