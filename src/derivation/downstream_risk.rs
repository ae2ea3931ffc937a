use serde::{Deserialize, Serialize};

use crate::classification::{DangerLevelStatus, RiskZone};
use crate::db::Category;
use crate::derivation::{
    check_finite, check_non_negative, check_positive, zip3, CrossEntityInputs, DerivationNotes,
    DerivationUnit, Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DownstreamRiskInputs {
    pub distance_to_nearest_town_km: Option<f64>,
    pub river_velocity: Option<f64>,
    pub river_width: Option<f64>,
    pub river_depth: Option<f64>,
    pub downstream_population: Option<u64>,
    pub safe_channel_capacity: Option<f64>,
    pub predicted_river_level: Option<f64>,
    pub flood_warning_level: Option<f64>,
    pub danger_level: Option<f64>,
}

impl Validate for DownstreamRiskInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_non_negative("distanceToNearestTownKm", self.distance_to_nearest_town_km)?;
        check_non_negative("riverVelocity", self.river_velocity)?;
        check_non_negative("riverWidth", self.river_width)?;
        check_non_negative("riverDepth", self.river_depth)?;
        check_non_negative("safeChannelCapacity", self.safe_channel_capacity)?;
        check_finite("predictedRiverLevel", self.predicted_river_level)?;
        check_positive("floodWarningLevel", self.flood_warning_level)?;
        check_positive("dangerLevel", self.danger_level)?;
        if let (Some(warning), Some(danger)) = (self.flood_warning_level, self.danger_level) {
            if danger < warning {
                return Err(EngineError::InvalidInput(format!(
                    "dangerLevel ({danger}) is below floodWarningLevel ({warning})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownstreamRiskDerived {
    /// Hours until a flood wave reaches the nearest town.
    pub flood_arrival_time: Option<f64>,
    pub river_cross_section_area: Option<f64>,
    pub hydraulic_radius: Option<f64>,
    pub channel_capacity_exceedance: Option<f64>,
    pub downstream_risk_score: Option<f64>,
    pub risk_zone: Option<RiskZone>,
    pub population_at_risk: Option<u64>,
    pub danger_level_status: Option<DangerLevelStatus>,
}

pub struct DownstreamRisk;

impl DerivationUnit for DownstreamRisk {
    const CATEGORY: Category = Category::DownstreamRisk;
    type Inputs = DownstreamRiskInputs;
    type Derived = DownstreamRiskDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();
        let channel = inputs.river_width.zip(inputs.river_depth);

        let arrival = inputs
            .distance_to_nearest_town_km
            .zip(inputs.river_velocity)
            .map(|(distance, velocity)| formulas::flood_arrival_time(distance, velocity));
        notes.assign("floodArrivalTime", &mut next.flood_arrival_time, arrival);
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
            "dangerLevelStatus",
            &mut next.danger_level_status,
            zip3(
                inputs.predicted_river_level,
                inputs.flood_warning_level,
                inputs.danger_level,
            )
            .map(|(level, warning, danger)| DangerLevelStatus::classify(level, warning, danger)),
        );

        match &cross.predictive_simulation {
            Some(simulation) => {
                let exceedance = simulation
                    .total_inflow
                    .zip(inputs.safe_channel_capacity)
                    .and_then(|(inflow, safe)| formulas::channel_exceedance(inflow, safe));
                notes.assign(
                    "channelCapacityExceedance",
                    &mut next.channel_capacity_exceedance,
                    exceedance,
                );

                let population = inputs.downstream_population.map(|p| p as f64);
                let score = zip3(arrival, exceedance, population).map(
                    |(arrival, exceedance, population)| {
                        formulas::downstream_risk_score(arrival, exceedance, population)
                    },
                );
                notes.assign("downstreamRiskScore", &mut next.downstream_risk_score, score);
                notes.assign(
                    "populationAtRisk",
                    &mut next.population_at_risk,
                    population
                        .zip(score)
                        .map(|(population, score)| {
                            formulas::population_at_risk(population, score) as u64
                        }),
                );
            }
            None => {
                notes.stale(Category::PredictiveSimulation, "channelCapacityExceedance");
                notes.stale(Category::PredictiveSimulation, "downstreamRiskScore");
                notes.stale(Category::PredictiveSimulation, "populationAtRisk");
            }
        }

        let zone = next.downstream_risk_score.map(RiskZone::from_score);
        notes.assign("riskZone", &mut next.risk_zone, zone);

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{DerivationNote, PredictiveSimulationDerived};

    fn inputs() -> DownstreamRiskInputs {
        DownstreamRiskInputs {
            distance_to_nearest_town_km: Some(36.0),
            river_velocity: Some(2.5),
            river_width: Some(40.0),
            river_depth: Some(5.0),
            downstream_population: Some(10_000),
            safe_channel_capacity: Some(800.0),
            predicted_river_level: Some(9.0),
            flood_warning_level: Some(10.0),
            danger_level: Some(12.0),
        }
    }

    fn simulation(total_inflow: f64) -> CrossEntityInputs {
        CrossEntityInputs {
            predictive_simulation: Some(PredictiveSimulationDerived {
                total_inflow: Some(total_inflow),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_downstream_fields() {
        let mut notes = DerivationNotes::default();
        let derived = DownstreamRisk::derive(
            &inputs(),
            &DownstreamRiskDerived::default(),
            &simulation(400.0),
            &mut notes,
        );

        // 36 km at 2.5 m/s
        assert!((derived.flood_arrival_time.unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(derived.river_cross_section_area, Some(200.0));
        assert_eq!(derived.channel_capacity_exceedance, Some(50.0));
        // 40/4 + 0.4*50 + 10000/5000
        assert!((derived.downstream_risk_score.unwrap() - 32.0).abs() < 1e-9);
        assert_eq!(derived.risk_zone, Some(RiskZone::Green));
        assert_eq!(derived.population_at_risk, Some(3200));
        assert_eq!(derived.danger_level_status, Some(DangerLevelStatus::Warning));
        assert!(notes.into_vec().is_empty());
    }

    #[test]
    fn test_missing_simulation_keeps_score() {
        let previous = DownstreamRiskDerived {
            downstream_risk_score: Some(75.0),
            ..Default::default()
        };
        let mut notes = DerivationNotes::default();
        let derived = DownstreamRisk::derive(
            &inputs(),
            &previous,
            &CrossEntityInputs::default(),
            &mut notes,
        );

        assert_eq!(derived.downstream_risk_score, Some(75.0));
        assert_eq!(derived.risk_zone, Some(RiskZone::Red));
        assert!(notes.into_vec().contains(&DerivationNote::StaleDependency {
            upstream: Category::PredictiveSimulation,
            field: "channelCapacityExceedance".to_string(),
        }));
    }

    #[test]
    fn test_danger_below_warning_is_rejected() {
        let inputs = DownstreamRiskInputs {
            flood_warning_level: Some(10.0),
            danger_level: Some(8.0),
            ..Default::default()
        };
        assert!(matches!(
            inputs.validate(),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
