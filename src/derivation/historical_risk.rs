use serde::{Deserialize, Serialize};

use crate::classification::RiskZone;
use crate::db::Category;
use crate::derivation::{
    check_finite, check_non_negative, zip3, CrossEntityInputs, DerivationNotes, DerivationUnit,
    Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HistoricalRiskInputs {
    pub past_flood_events: Option<f64>,
    pub years_of_record: Option<f64>,
    pub max_recorded_water_level: Option<f64>,
    pub current_water_level: Option<f64>,
    pub average_annual_peak_inflow: Option<f64>,
    pub current_inflow: Option<f64>,
}

impl Validate for HistoricalRiskInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_non_negative("pastFloodEvents", self.past_flood_events)?;
        check_non_negative("yearsOfRecord", self.years_of_record)?;
        check_finite("maxRecordedWaterLevel", self.max_recorded_water_level)?;
        check_finite("currentWaterLevel", self.current_water_level)?;
        check_non_negative("averageAnnualPeakInflow", self.average_annual_peak_inflow)?;
        check_non_negative("currentInflow", self.current_inflow)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoricalRiskDerived {
    pub flood_frequency: Option<f64>,
    pub level_exceedance_ratio: Option<f64>,
    pub inflow_anomaly: Option<f64>,
    pub historical_risk_index: Option<f64>,
    pub risk_zone: Option<RiskZone>,
}

pub struct HistoricalRisk;

impl DerivationUnit for HistoricalRisk {
    const CATEGORY: Category = Category::HistoricalRisk;
    type Inputs = HistoricalRiskInputs;
    type Derived = HistoricalRiskDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        _cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();

        let frequency = inputs
            .past_flood_events
            .zip(inputs.years_of_record)
            .and_then(|(events, years)| formulas::flood_frequency(events, years));
        let exceedance = inputs
            .current_water_level
            .zip(inputs.max_recorded_water_level)
            .and_then(|(level, max)| formulas::percentage(level, max));
        let anomaly = inputs
            .current_inflow
            .zip(inputs.average_annual_peak_inflow)
            .and_then(|(current, average)| formulas::inflow_anomaly(current, average));

        notes.assign("floodFrequency", &mut next.flood_frequency, frequency);
        notes.assign("levelExceedanceRatio", &mut next.level_exceedance_ratio, exceedance);
        notes.assign("inflowAnomaly", &mut next.inflow_anomaly, anomaly);
        // Needs all three contributors from this pass, not stale ones
        notes.assign(
            "historicalRiskIndex",
            &mut next.historical_risk_index,
            zip3(frequency, exceedance, anomaly).map(|(frequency, exceedance, anomaly)| {
                formulas::historical_risk_index(frequency, exceedance, anomaly)
            }),
        );

        let zone = next.historical_risk_index.map(RiskZone::from_score);
        notes.assign("riskZone", &mut next.risk_zone, zone);

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::DerivationNote;

    #[test]
    fn test_historical_index() {
        let inputs = HistoricalRiskInputs {
            past_flood_events: Some(6.0),
            years_of_record: Some(30.0),
            max_recorded_water_level: Some(200.0),
            current_water_level: Some(180.0),
            average_annual_peak_inflow: Some(1000.0),
            current_inflow: Some(1500.0),
        };
        let mut notes = DerivationNotes::default();
        let derived = HistoricalRisk::derive(
            &inputs,
            &HistoricalRiskDerived::default(),
            &CrossEntityInputs::default(),
            &mut notes,
        );

        assert!((derived.flood_frequency.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(derived.level_exceedance_ratio, Some(90.0));
        assert_eq!(derived.inflow_anomaly, Some(50.0));
        // 4 + 36 + 10
        assert!((derived.historical_risk_index.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(derived.risk_zone, Some(RiskZone::Yellow));
    }

    #[test]
    fn test_zero_years_of_record_skips_index() {
        let inputs = HistoricalRiskInputs {
            past_flood_events: Some(6.0),
            years_of_record: Some(0.0),
            max_recorded_water_level: Some(200.0),
            current_water_level: Some(180.0),
            average_annual_peak_inflow: Some(1000.0),
            current_inflow: Some(1500.0),
        };
        let mut notes = DerivationNotes::default();
        let derived = HistoricalRisk::derive(
            &inputs,
            &HistoricalRiskDerived::default(),
            &CrossEntityInputs::default(),
            &mut notes,
        );

        assert_eq!(derived.flood_frequency, None);
        assert_eq!(derived.historical_risk_index, None);
        let notes = notes.into_vec();
        assert!(notes.contains(&DerivationNote::ComputationSkipped {
            field: "historicalRiskIndex".to_string()
        }));
    }
}
