//! Domain types threaded through the pipeline

pub mod context;
pub mod indicators;
pub mod outcome;
pub mod policy;

pub use context::{ContextError, SimulationContext, SimulationRequest, StageId};
pub use indicators::{BehaviorIndicators, ImpactIndicators, InfrastructureStress, SimulationMetrics};
pub use outcome::{
    ExplanationReport, FeatureWeight, ImprovementBasis, OptimizationOutcome, Priority,
    Recommendation,
};
pub use policy::{PolicyParameters, PolicyType, Region, TokenUsage};

/// Round half away from zero to `places` decimal places
///
/// ```rust
/// use policy_simulator_core_rs::models::round_to;
///
/// assert_eq!(round_to(0.74449, 3), 0.744);
/// assert_eq!(round_to(1234.56, 0), 1235.0);
/// ```
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
