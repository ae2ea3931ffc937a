use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::Category;
use crate::derivation::{
    check_non_negative, CrossEntityInputs, DerivationNotes, DerivationUnit, Validate,
};
use crate::error::EngineError;
use crate::formulas;

/// |netFlow| below this is reported as stable, in m³/s.
const STABLE_FLOW_BAND: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum FlowTrend {
    Rising,
    Stable,
    Falling,
}

impl FlowTrend {
    pub fn from_net_flow(net_flow: f64) -> Self {
        if net_flow >= STABLE_FLOW_BAND {
            FlowTrend::Rising
        } else if net_flow <= -STABLE_FLOW_BAND {
            FlowTrend::Falling
        } else {
            FlowTrend::Stable
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DamStatusInputs {
    pub inflow_from_upstream_dam: Option<f64>,
    pub outflow_to_downstream_dam: Option<f64>,
    pub upstream_river_cross_section: Option<f64>,
    pub downstream_river_cross_section: Option<f64>,
    pub current_inflow: Option<f64>,
    pub current_outflow: Option<f64>,
}

impl Validate for DamStatusInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_non_negative("inflowFromUpstreamDam", self.inflow_from_upstream_dam)?;
        check_non_negative("outflowToDownstreamDam", self.outflow_to_downstream_dam)?;
        check_non_negative("upstreamRiverCrossSection", self.upstream_river_cross_section)?;
        check_non_negative(
            "downstreamRiverCrossSection",
            self.downstream_river_cross_section,
        )?;
        check_non_negative("currentInflow", self.current_inflow)?;
        check_non_negative("currentOutflow", self.current_outflow)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DamStatusDerived {
    pub upstream_river_velocity: Option<f64>,
    pub downstream_river_velocity: Option<f64>,
    pub net_flow: Option<f64>,
    pub flow_trend: Option<FlowTrend>,
}

pub struct DamStatus;

impl DerivationUnit for DamStatus {
    const CATEGORY: Category = Category::DamStatus;
    type Inputs = DamStatusInputs;
    type Derived = DamStatusDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();

        // No linked dam on a side means no flow across it.
        let (upstream_flow, downstream_flow) = match cross.links {
            Some(links) => (
                inputs
                    .inflow_from_upstream_dam
                    .or((!links.has_upstream).then_some(0.0)),
                inputs
                    .outflow_to_downstream_dam
                    .or((!links.has_downstream).then_some(0.0)),
            ),
            None => (
                inputs.inflow_from_upstream_dam,
                inputs.outflow_to_downstream_dam,
            ),
        };

        // A zero flow gives zero velocity even without a cross-section
        let velocity = |flow: Option<f64>, section: Option<f64>| {
            flow.and_then(|flow| formulas::river_velocity(flow, section.unwrap_or(0.0)))
        };
        notes.assign(
            "upstreamRiverVelocity",
            &mut next.upstream_river_velocity,
            velocity(upstream_flow, inputs.upstream_river_cross_section),
        );
        notes.assign(
            "downstreamRiverVelocity",
            &mut next.downstream_river_velocity,
            velocity(downstream_flow, inputs.downstream_river_cross_section),
        );
        notes.assign(
            "netFlow",
            &mut next.net_flow,
            inputs
                .current_inflow
                .zip(inputs.current_outflow)
                .map(|(inflow, outflow)| formulas::net_inflow(inflow, outflow)),
        );

        let trend = next.net_flow.map(FlowTrend::from_net_flow);
        notes.assign("flowTrend", &mut next.flow_trend, trend);

        next
    }
}
