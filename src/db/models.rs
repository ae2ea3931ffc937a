use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::derivation::BasinContext;

/// Telemetry category. One current snapshot exists per dam per category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum Category {
    ReservoirGeometry,
    StorageCapacity,
    ForecastMeteo,
    PredictiveSimulation,
    HistoricalRisk,
    StructuralHealth,
    GateSpillway,
    DownstreamRisk,
    BasinAggregated,
    SafetyAlert,
    DamStatus,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::ReservoirGeometry,
        Category::StorageCapacity,
        Category::ForecastMeteo,
        Category::PredictiveSimulation,
        Category::HistoricalRisk,
        Category::StructuralHealth,
        Category::GateSpillway,
        Category::DownstreamRisk,
        Category::BasinAggregated,
        Category::SafetyAlert,
        Category::DamStatus,
    ];

    /// Wire name, also the value stored in the `category` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ReservoirGeometry => "ReservoirGeometry",
            Category::StorageCapacity => "StorageCapacity",
            Category::ForecastMeteo => "ForecastMeteo",
            Category::PredictiveSimulation => "PredictiveSimulation",
            Category::HistoricalRisk => "HistoricalRisk",
            Category::StructuralHealth => "StructuralHealth",
            Category::GateSpillway => "GateSpillway",
            Category::DownstreamRisk => "DownstreamRisk",
            Category::BasinAggregated => "BasinAggregated",
            Category::SafetyAlert => "SafetyAlert",
            Category::DamStatus => "DamStatus",
        }
    }

    /// URL slug, e.g. `reservoir-geometry`.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::ReservoirGeometry => "reservoir-geometry",
            Category::StorageCapacity => "storage-capacity",
            Category::ForecastMeteo => "forecast-meteo",
            Category::PredictiveSimulation => "predictive-simulation",
            Category::HistoricalRisk => "historical-risk",
            Category::StructuralHealth => "structural-health",
            Category::GateSpillway => "gate-spillway",
            Category::DownstreamRisk => "downstream-risk",
            Category::BasinAggregated => "basin-aggregated",
            Category::SafetyAlert => "safety-alert",
            Category::DamStatus => "dam-status",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.slug() == s)
            .ok_or_else(|| format!("unknown telemetry category '{s}'"))
    }
}

/// Root entity. Upstream/downstream links form the basin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dam {
    pub id: i64,
    pub name: String,
    pub state: String,
    pub river: String,
    pub height_m: Option<f64>,
    pub length_m: Option<f64>,
    pub gross_storage_capacity: Option<f64>,
    pub live_storage_capacity: Option<f64>,
    pub upstream_dam_id: Option<i64>,
    pub upstream_distance_km: Option<f64>,
    pub downstream_dam_id: Option<i64>,
    pub downstream_distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dam {
    /// Ids of the dams this dam links to directly.
    pub fn linked_dam_ids(&self) -> impl Iterator<Item = i64> {
        self.upstream_dam_id.into_iter().chain(self.downstream_dam_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDam {
    pub name: String,
    pub state: String,
    pub river: String,
    #[serde(default)]
    pub height_m: Option<f64>,
    #[serde(default)]
    pub length_m: Option<f64>,
    #[serde(default)]
    pub gross_storage_capacity: Option<f64>,
    #[serde(default)]
    pub live_storage_capacity: Option<f64>,
    #[serde(default)]
    pub upstream_dam_id: Option<i64>,
    #[serde(default)]
    pub upstream_distance_km: Option<f64>,
    #[serde(default)]
    pub downstream_dam_id: Option<i64>,
    #[serde(default)]
    pub downstream_distance_km: Option<f64>,
}

/// Persisted form of one telemetry snapshot.
///
/// `inputs` and `derived` hold the category's camelCase field objects; the
/// typed structs live in [`crate::derivation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    pub dam_id: i64,
    pub category: Category,
    #[schema(value_type = Object)]
    pub inputs: serde_json::Value,
    #[schema(value_type = Object)]
    pub derived: serde_json::Value,
    pub input_revision: i64,
    pub computed_revision: Option<i64>,
    pub dependency_revisions: BTreeMap<Category, i64>,
    /// Dam-link facts consumed by the last derivation; only `BasinAggregated`
    /// reads them.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub basin_context: Option<BasinContext>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredSnapshot {
    /// Empty snapshot for a first write; timestamps are replaced on upsert.
    pub fn empty(dam_id: i64, category: Category) -> Self {
        let now = Utc::now();
        Self {
            dam_id,
            category,
            inputs: serde_json::Value::Object(serde_json::Map::new()),
            derived: serde_json::Value::Object(serde_json::Map::new()),
            input_revision: 0,
            computed_revision: None,
            dependency_revisions: BTreeMap::new(),
            basin_context: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the derived block was computed from the current inputs,
    /// from the given upstream revisions and from the given basin context.
    pub fn is_fresh(
        &self,
        upstream_revisions: &BTreeMap<Category, i64>,
        basin: Option<&BasinContext>,
    ) -> bool {
        self.computed_revision == Some(self.input_revision)
            && &self.dependency_revisions == upstream_revisions
            && self.basin_context.as_ref() == basin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parses_wire_name_and_slug() {
        assert_eq!(
            "BasinAggregated".parse::<Category>().unwrap(),
            Category::BasinAggregated
        );
        assert_eq!(
            "safety-alert".parse::<Category>().unwrap(),
            Category::SafetyAlert
        );
        assert!("Basin".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serializes_as_wire_name() {
        let json = serde_json::to_string(&Category::DamStatus).unwrap();
        assert_eq!(json, "\"DamStatus\"");
    }

    #[test]
    fn test_freshness_tracks_revisions() {
        let mut snapshot = StoredSnapshot::empty(1, Category::BasinAggregated);
        snapshot.input_revision = 2;
        snapshot.computed_revision = Some(2);
        snapshot
            .dependency_revisions
            .insert(Category::StructuralHealth, 5);

        let mut upstream = BTreeMap::new();
        upstream.insert(Category::StructuralHealth, 5);
        assert!(snapshot.is_fresh(&upstream, None));

        upstream.insert(Category::StructuralHealth, 6);
        assert!(!snapshot.is_fresh(&upstream, None));

        upstream.insert(Category::StructuralHealth, 5);
        snapshot.input_revision = 3;
        assert!(!snapshot.is_fresh(&upstream, None));
    }

    #[test]
    fn test_freshness_tracks_basin_context() {
        let mut snapshot = StoredSnapshot::empty(1, Category::BasinAggregated);
        snapshot.computed_revision = Some(0);
        snapshot.basin_context = Some(BasinContext {
            dams_in_basin: 1,
            ..Default::default()
        });
        let upstream = BTreeMap::new();

        let unchanged = BasinContext {
            dams_in_basin: 1,
            ..Default::default()
        };
        assert!(snapshot.is_fresh(&upstream, Some(&unchanged)));

        let grown = BasinContext {
            dams_in_basin: 2,
            nearest_upstream_distance_km: Some(5.0),
            nearest_downstream_distance_km: None,
        };
        assert!(!snapshot.is_fresh(&upstream, Some(&grown)));
        assert!(!snapshot.is_fresh(&upstream, None));
    }
}
