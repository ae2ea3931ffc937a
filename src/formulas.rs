//! Closed-form operational formulas.
//!
//! Every function is pure. Functions returning `Option` yield `None` when the
//! value is undefined for the given inputs (zero divisor, empty range); callers
//! then leave the derived field untouched.
//!
//! The constants here are operational heuristics, not hydraulic models. The
//! golden-value tests at the bottom pin them.

/// Returned by [`time_to_full_capacity`] when the reservoir is not filling.
pub const TIME_TO_FULL_SENTINEL_HOURS: f64 = 999.0;

/// Metres of level change per (m³/s of net inflow · hour).
pub const LEVEL_RISE_PER_NET_INFLOW_HOUR: f64 = 0.001;

const SECONDS_PER_HOUR: f64 = 3600.0;

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// m³/s
pub fn net_inflow(inflow_rate: f64, outflow_rate: f64) -> f64 {
    inflow_rate - outflow_rate
}

pub fn available_storage(max_capacity: f64, current_storage: f64) -> f64 {
    (max_capacity - current_storage).max(0.0)
}

/// Hours until the reservoir is full at the current net inflow.
pub fn time_to_full_capacity(available_storage: f64, net_inflow_rate: f64) -> f64 {
    if net_inflow_rate > 0.0 {
        available_storage / (net_inflow_rate * SECONDS_PER_HOUR)
    } else {
        TIME_TO_FULL_SENTINEL_HOURS
    }
}

/// Linear extrapolation of the water level `horizon_hours` ahead.
pub fn predicted_water_level(current_level: f64, net_inflow_rate: f64, horizon_hours: f64) -> f64 {
    current_level + (net_inflow_rate * LEVEL_RISE_PER_NET_INFLOW_HOUR) * horizon_hours
}

/// Hours for a flood wave to travel `distance_km` at `velocity_ms`.
/// Zero when either is non-positive.
pub fn flood_arrival_time(distance_km: f64, velocity_ms: f64) -> f64 {
    if distance_km <= 0.0 || velocity_ms <= 0.0 {
        return 0.0;
    }
    (distance_km * 1000.0) / (velocity_ms * SECONDS_PER_HOUR)
}

/// Weighted flood risk score in 0..=100.
///
/// Storage pressure contributes `40 * current / max`; inflow and rainfall
/// pressure are each capped at 30 before the sum is clamped.
pub fn flood_risk_score(
    current_storage: f64,
    max_capacity: f64,
    net_inflow_rate: f64,
    forecast_rainfall: f64,
) -> Option<f64> {
    if max_capacity <= 0.0 {
        return None;
    }
    let storage_term = 40.0 * (current_storage / max_capacity);
    let inflow_term = (30.0 * net_inflow_rate / 1000.0).min(30.0);
    let rainfall_term = (30.0 * forecast_rainfall / 100.0).min(30.0);
    Some(clamp_percent(storage_term + inflow_term + rainfall_term))
}

/// Percent.
pub fn structural_failure_probability(health_score: f64, stress_index: f64) -> f64 {
    ((1.0 - health_score / 100.0) * 100.0 * (1.0 + stress_index)).min(100.0)
}

/// Rectangular channel approximation.
pub fn cross_section_area(width: f64, depth: f64) -> f64 {
    width * depth
}

pub fn hydraulic_radius(width: f64, depth: f64) -> Option<f64> {
    let wetted_perimeter = width + 2.0 * depth;
    if wetted_perimeter <= 0.0 {
        return None;
    }
    Some((width * depth) / wetted_perimeter)
}

/// Orifice-style discharge law.
pub fn effective_discharge_capacity(
    discharge_coefficient: f64,
    gate_opening_percentage: f64,
    head: f64,
) -> f64 {
    discharge_coefficient * (gate_opening_percentage / 100.0) * head.sqrt()
}

pub fn percentage(part: f64, whole: f64) -> Option<f64> {
    if whole <= 0.0 {
        return None;
    }
    Some(part / whole * 100.0)
}

pub fn storage_utilization(current_storage: f64, max_storage: f64) -> Option<f64> {
    percentage(current_storage, max_storage)
}

/// How full the reservoir is between dead storage level and full level.
pub fn level_fill_percentage(level: f64, dead_level: f64, full_level: f64) -> Option<f64> {
    if full_level <= dead_level {
        return None;
    }
    Some(clamp_percent(
        (level - dead_level) / (full_level - dead_level) * 100.0,
    ))
}

pub fn capacity_loss_percentage(sedimentation_rate_per_year: f64, years: f64) -> f64 {
    (sedimentation_rate_per_year * years).min(100.0)
}

pub fn effective_capacity(max_storage: f64, capacity_loss_percentage: f64) -> f64 {
    max_storage * (1.0 - capacity_loss_percentage / 100.0)
}

/// m³ of runoff from `rainfall_mm` over `catchment_km2`.
pub fn runoff_volume(rainfall_mm: f64, catchment_km2: f64, runoff_coefficient: f64) -> f64 {
    rainfall_mm / 1000.0 * catchment_km2 * 1_000_000.0 * runoff_coefficient
}

/// m³/s added to inflow if `volume` arrives evenly over `hours`.
pub fn inflow_increase(volume: f64, hours: f64) -> Option<f64> {
    if hours <= 0.0 {
        return None;
    }
    Some(volume / (hours * SECONDS_PER_HOUR))
}

/// mm/h
pub fn rainfall_intensity(rainfall_mm: f64, hours: f64) -> Option<f64> {
    if hours <= 0.0 {
        return None;
    }
    Some(rainfall_mm / hours)
}

pub fn storm_risk_score(rainfall_mm: f64, wind_speed_kmh: f64) -> f64 {
    clamp_percent(0.6 * rainfall_mm + 0.8 * wind_speed_kmh)
}

/// Structural health in 0..=100 from instrumented deterioration signals.
pub fn dam_health_score(
    crack_width_mm: f64,
    seepage_rate_lpm: f64,
    vibration_level_mms: f64,
    deformation_mm: f64,
) -> f64 {
    clamp_percent(
        100.0
            - 10.0 * crack_width_mm
            - 0.5 * seepage_rate_lpm
            - 2.0 * vibration_level_mms
            - deformation_mm,
    )
}

/// Flood events per year of record.
pub fn flood_frequency(events: f64, years_of_record: f64) -> Option<f64> {
    if years_of_record <= 0.0 {
        return None;
    }
    Some(events / years_of_record)
}

/// Percent deviation of the current inflow from the annual peak average.
pub fn inflow_anomaly(current_inflow: f64, average_peak_inflow: f64) -> Option<f64> {
    if average_peak_inflow <= 0.0 {
        return None;
    }
    Some((current_inflow - average_peak_inflow) / average_peak_inflow * 100.0)
}

pub fn historical_risk_index(
    flood_frequency: f64,
    level_exceedance_ratio: f64,
    inflow_anomaly: f64,
) -> f64 {
    let frequency_term = (20.0 * flood_frequency).min(40.0);
    let exceedance_term = (0.4 * level_exceedance_ratio).min(40.0);
    let anomaly_term = (0.2 * inflow_anomaly.max(0.0)).min(20.0);
    clamp_percent(frequency_term + exceedance_term + anomaly_term)
}

/// m/s. A zero flow always yields zero velocity, whatever the cross-section.
pub fn river_velocity(flow: f64, cross_section: f64) -> Option<f64> {
    if flow == 0.0 {
        return Some(0.0);
    }
    if cross_section <= 0.0 {
        return None;
    }
    Some(flow / cross_section)
}

pub fn channel_exceedance(flow: f64, safe_channel_capacity: f64) -> Option<f64> {
    percentage(flow, safe_channel_capacity)
}

pub fn downstream_risk_score(
    arrival_time_hours: f64,
    channel_exceedance: f64,
    population: f64,
) -> f64 {
    let urgency_term = if arrival_time_hours > 0.0 {
        (40.0 / arrival_time_hours).min(40.0)
    } else {
        0.0
    };
    let exceedance_term = (0.4 * channel_exceedance).min(40.0);
    let population_term = (population / 5000.0).min(20.0);
    clamp_percent(urgency_term + exceedance_term + population_term)
}

pub fn population_at_risk(population: f64, risk_score: f64) -> f64 {
    (population * risk_score / 100.0).round()
}

/// Basin-level estimate. Stresses are 0..=1 indices.
pub fn cascading_failure_probability(
    upstream_stress: f64,
    downstream_stress: f64,
    health_score: f64,
) -> f64 {
    clamp_percent(
        (0.5 * upstream_stress + 0.3 * downstream_stress) * 100.0 + (100.0 - health_score) * 0.2,
    )
}
