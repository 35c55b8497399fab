//! Simulation Stage
//!
//! Aggregate agent-based simulation against the regional baseline.
//!
//! # Formulas
//!
//! ```text
//! reduction    = min(0.25, (0.03·lanes + 0.02·metro + 0.01·bus) · compliance)
//! congestion   = max(0.1, traffic_index/100 − reduction)
//! ev_adoption  = min(0.15, 100 · charging / vehicles)        (0.05 if no vehicles)
//! energy       = 0.3 + 2 · ev_adoption
//! adequacy     = min(1, (budget / population) / 500)
//! dissatisfied = max(0.1, 0.5 − 0.3·adequacy + 0.3·enforcement − 0.2·satisfaction)
//! stability    = min(1, 0.7 + 10 · budget / (200,000 · population) − 0.2·dissatisfied)
//! stress       = min(1, (vehicles / area) / 10,000)
//! ```
//!
//! The four metrics and the stress level are rounded to three places; the
//! density and percentage fields of the stress record to one place.
//!
//! # Degraded mode
//!
//! Without a usable regional baseline (unknown region, or a baseline with no
//! population or area) the stage writes `SimulationMetrics::fallback()`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::Stage;
use crate::models::policy::infrastructure;
use crate::models::{
    round_to, BehaviorIndicators, InfrastructureStress, PolicyParameters, SimulationContext,
    SimulationMetrics, StageId,
};
use crate::orchestrator::PipelineError;
use crate::region::{lookup_baseline, lookup_traffic, RegionBaseline, RegionalDataProvider, TrafficBaseline};

/// Cap on the total congestion reduction
pub const MAX_CONGESTION_REDUCTION: f64 = 0.25;

/// Congestion never drops below this
pub const MIN_CONGESTION: f64 = 0.1;

const LANE_EFFECT: f64 = 0.03;
const METRO_EFFECT: f64 = 0.02;
const BUS_EFFECT: f64 = 0.01;

const MAX_EV_ADOPTION: f64 = 0.15;
const EV_ADOPTION_WITHOUT_VEHICLES: f64 = 0.05;

/// Per-capita spend (rupees) treated as fully adequate
const REFERENCE_PER_CAPITA_BUDGET: f64 = 500.0;

/// Rough per-capita GDP (rupees) for the state GDP estimate
const PER_CAPITA_GDP: f64 = 200_000.0;

/// Vehicles per km² treated as maximum stress
const HIGH_VEHICLE_DENSITY: f64 = 10_000.0;

/// Total congestion reduction from infrastructure changes
///
/// Non-decreasing in each count and capped at `MAX_CONGESTION_REDUCTION`.
///
/// ```rust
/// use policy_simulator_core_rs::stages::simulation::congestion_reduction;
///
/// assert!((congestion_reduction(2.0, 0.0, 0.0, 0.5) - 0.03).abs() < 1e-12);
/// assert_eq!(congestion_reduction(100.0, 100.0, 100.0, 0.9), 0.25);
/// ```
pub fn congestion_reduction(lanes: f64, metro_stations: f64, bus_routes: f64, compliance: f64) -> f64 {
    let raw = LANE_EFFECT * lanes * compliance
        + METRO_EFFECT * metro_stations * compliance
        + BUS_EFFECT * bus_routes * compliance;
    raw.clamp(0.0, MAX_CONGESTION_REDUCTION)
}

/// Run the simulation formulas
pub fn simulate(
    policy: &PolicyParameters,
    behavior: &BehaviorIndicators,
    baseline: Option<&RegionBaseline>,
    traffic: &TrafficBaseline,
) -> SimulationMetrics {
    let baseline = match baseline {
        Some(b) if b.population > 0 && b.area_sq_km > 0.0 => b,
        _ => return SimulationMetrics::fallback(),
    };

    let population = baseline.population as f64;
    let vehicles = baseline.vehicle_count as f64;
    let budget = policy.budget();

    let current_congestion = (traffic.congestion_level / 100.0).clamp(0.0, 1.0);
    let reduction = congestion_reduction(
        policy.infrastructure(infrastructure::NEW_LANES),
        policy.infrastructure(infrastructure::METRO_STATIONS),
        policy.infrastructure(infrastructure::BUS_ROUTES),
        behavior.compliance_probability,
    );
    let congestion = (current_congestion - reduction).max(MIN_CONGESTION);

    let charging = policy.infrastructure(infrastructure::CHARGING_STATIONS);
    let ev_adoption = if baseline.vehicle_count > 0 {
        (charging / vehicles * 100.0).clamp(0.0, MAX_EV_ADOPTION)
    } else {
        EV_ADOPTION_WITHOUT_VEHICLES
    };
    let energy = 0.3 + 2.0 * ev_adoption;

    let adequacy = (budget / population / REFERENCE_PER_CAPITA_BUDGET).min(1.0);
    let dissatisfaction = (0.5 - 0.3 * adequacy + 0.3 * policy.enforcement_level()
        - 0.2 * behavior.satisfaction_score)
        .max(0.1);

    let gdp = population * PER_CAPITA_GDP;
    let stability = (0.7 + 10.0 * budget / gdp - 0.2 * dissatisfaction).clamp(0.0, 1.0);

    let density = vehicles / baseline.area_sq_km;
    let stress = (density / HIGH_VEHICLE_DENSITY).min(1.0);

    SimulationMetrics {
        congestion_score: round_to(congestion, 3),
        energy_load: round_to(energy, 3),
        dissatisfaction_index: round_to(dissatisfaction, 3),
        economic_stability: round_to(stability, 3),
        infrastructure_stress: InfrastructureStress::Measured {
            vehicle_density_per_sqkm: round_to(density, 1),
            stress_level: round_to(stress, 3),
            current_congestion_percent: round_to(current_congestion * 100.0, 1),
            projected_congestion_percent: round_to(congestion * 100.0, 1),
            congestion_reduction_percent: round_to(reduction * 100.0, 1),
        },
    }
}

/// Writes `simulation_metrics`
pub struct SimulationStage {
    provider: Arc<dyn RegionalDataProvider>,
}

impl SimulationStage {
    pub fn new(provider: Arc<dyn RegionalDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for SimulationStage {
    fn id(&self) -> StageId {
        StageId::Simulation
    }

    async fn run(&self, ctx: &mut SimulationContext) -> Result<(), PipelineError> {
        let policy = ctx.require_structured_policy(StageId::Simulation)?.clone();
        let behavior = *ctx.require_behavior_output(StageId::Simulation)?;

        let region_id = policy.region.id();
        let baseline = lookup_baseline(self.provider.as_ref(), region_id).await;
        let traffic = lookup_traffic(self.provider.as_ref(), region_id).await;

        if baseline.is_none() {
            warn!(
                request_id = %ctx.request_id,
                region = region_id,
                "no regional baseline, using fallback simulation metrics"
            );
        }

        let metrics = simulate(&policy, &behavior, baseline.as_ref(), &traffic);
        info!(
            request_id = %ctx.request_id,
            stage = "simulation",
            region = region_id,
            congestion = metrics.congestion_score,
            energy = metrics.energy_load,
            dissatisfaction = metrics.dissatisfaction_index,
            stability = metrics.economic_stability,
            "simulation complete"
        );
        ctx.set_simulation_metrics(metrics);
        Ok(())
    }
}
