#![allow(dead_code)]

use std::sync::Arc;

use dam_safety_service::db::{Dam, InMemoryStore, NewDam};
use dam_safety_service::services::Services;
use serde_json::{json, Value};

pub const ALERT_THRESHOLD: f64 = 50.0;

/// Services over a fresh in-memory store.
pub fn test_services() -> Services {
    test_services_with_store().0
}

/// Services plus a handle on the store behind them, for tests that need to
/// change rows underneath the services.
pub fn test_services_with_store() -> (Services, InMemoryStore) {
    let store = InMemoryStore::new();
    let services = Services::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        4,
        ALERT_THRESHOLD,
    );
    (services, store)
}

pub fn new_dam(name: &str) -> NewDam {
    NewDam {
        name: name.to_string(),
        state: "Maharashtra".to_string(),
        river: "Krishna".to_string(),
        height_m: Some(45.0),
        length_m: Some(800.0),
        gross_storage_capacity: Some(120_000.0),
        live_storage_capacity: Some(100_000.0),
        ..Default::default()
    }
}

pub async fn seed_dam(services: &Services, name: &str) -> Dam {
    services
        .register_dam(&new_dam(name))
        .await
        .expect("Failed to seed dam")
}

/// Three dams on one river: upper -> middle -> lower.
pub async fn seed_chain(services: &Services) -> (Dam, Dam, Dam) {
    let upper = seed_dam(services, "Upper").await;
    let middle = services
        .register_dam(&NewDam {
            upstream_dam_id: Some(upper.id),
            upstream_distance_km: Some(12.0),
            ..new_dam("Middle")
        })
        .await
        .expect("Failed to seed middle dam");
    let lower = services
        .register_dam(&NewDam {
            upstream_dam_id: Some(middle.id),
            upstream_distance_km: Some(30.0),
            ..new_dam("Lower")
        })
        .await
        .expect("Failed to seed lower dam");
    (upper, middle, lower)
}

/// Safety inputs for a dam close to full with a damaged structure.
pub fn scenario_safety_inputs() -> Value {
    json!({
        "currentWaterLevel": 120.0,
        "fullReservoirLevel": 125.0,
        "maxCapacity": 100000.0,
        "currentStorage": 99000.0,
        "inflowRate": 300.0,
        "outflowRate": 200.0,
        "structuralHealthScore": 70.0,
        "structuralStressIndex": 0.5,
        "forecastRainfall": 80.0,
        "downstreamDistanceKm": 36.0,
        "downstreamVelocity": 2.0
    })
}

pub fn approx(actual: &Value, expected: f64) -> bool {
    actual
        .as_f64()
        .is_some_and(|actual| (actual - expected).abs() < 1e-6)
}
