//! Indicator records written by the behavior, simulation and impact stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lower bound for adaptation, compliance and satisfaction
pub const BEHAVIOR_FLOOR: f64 = 0.1;

/// Upper bound for every behavior indicator
pub const BEHAVIOR_CEILING: f64 = 0.95;

/// Lower bound for the personal economic impact indicator
pub const PERSONAL_IMPACT_FLOOR: f64 = 0.05;

/// Predicted citizen response to a policy
///
/// Every field lies strictly inside (0, 1) so downstream products never
/// collapse to zero or saturate at one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorIndicators {
    pub adaptation_rate: f64,
    pub compliance_probability: f64,
    pub satisfaction_score: f64,
    pub economic_impact_personal: f64,
}

impl BehaviorIndicators {
    /// Clamp four raw predictions into their documented sub-ranges
    ///
    /// Non-finite inputs land on the lower bound.
    ///
    /// # Example
    ///
    /// ```rust
    /// use policy_simulator_core_rs::models::BehaviorIndicators;
    ///
    /// let b = BehaviorIndicators::clamped([1.4, -0.2, 0.5, 0.0]);
    /// assert_eq!(b.adaptation_rate, 0.95);
    /// assert_eq!(b.compliance_probability, 0.1);
    /// assert_eq!(b.satisfaction_score, 0.5);
    /// assert_eq!(b.economic_impact_personal, 0.05);
    /// ```
    pub fn clamped(raw: [f64; 4]) -> Self {
        Self {
            adaptation_rate: clamp_finite(raw[0], BEHAVIOR_FLOOR, BEHAVIOR_CEILING),
            compliance_probability: clamp_finite(raw[1], BEHAVIOR_FLOOR, BEHAVIOR_CEILING),
            satisfaction_score: clamp_finite(raw[2], BEHAVIOR_FLOOR, BEHAVIOR_CEILING),
            economic_impact_personal: clamp_finite(
                raw[3],
                PERSONAL_IMPACT_FLOOR,
                BEHAVIOR_CEILING,
            ),
        }
    }
}

fn clamp_finite(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        lo
    }
}

/// Descriptive infrastructure sub-record of the simulation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfrastructureStress {
    Measured {
        vehicle_density_per_sqkm: f64,
        stress_level: f64,
        current_congestion_percent: f64,
        projected_congestion_percent: f64,
        congestion_reduction_percent: f64,
    },
    /// Degraded mode: no regional baseline was available
    Unavailable { note: String },
}

impl InfrastructureStress {
    pub fn unavailable() -> Self {
        InfrastructureStress::Unavailable {
            note: "Using default values - state data not available".to_string(),
        }
    }

    /// Number of named sub-indicators carried by the record
    pub fn indicator_count(&self) -> usize {
        match self {
            InfrastructureStress::Measured { .. } => 5,
            InfrastructureStress::Unavailable { .. } => 1,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, InfrastructureStress::Measured { .. })
    }
}

/// Aggregate outcome of the agent-based simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub congestion_score: f64,
    pub energy_load: f64,
    pub dissatisfaction_index: f64,
    pub economic_stability: f64,
    pub infrastructure_stress: InfrastructureStress,
}

impl SimulationMetrics {
    /// Record used when no regional baseline exists
    pub fn fallback() -> Self {
        Self {
            congestion_score: 0.5,
            energy_load: 0.4,
            dissatisfaction_index: 0.3,
            economic_stability: 0.7,
            infrastructure_stress: InfrastructureStress::unavailable(),
        }
    }
}

/// Macro-level forecast
///
/// `congestion_score`, `dissatisfaction_index` and `energy_stress` are copied
/// from the simulation metrics. The ensemble outputs only survive as
/// `advisory_predictions` and as the centres of `confidence_intervals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactIndicators {
    pub congestion_score: f64,
    pub inflation_rate: f64,
    pub dissatisfaction_index: f64,
    pub energy_stress: f64,
    /// Indicator → [low, high]
    pub confidence_intervals: BTreeMap<String, [f64; 2]>,
    pub baseline_congestion: f64,
    /// Raw ensemble output per indicator
    pub advisory_predictions: BTreeMap<String, f64>,
    pub real_data_used: bool,
}
