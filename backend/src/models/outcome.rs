//! Optimization outcome and explanation report records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::policy::PolicyParameters;

/// How `improvement_percentage` was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementBasis {
    /// Sampled placeholder; no counterfactual re-simulation was run
    HeuristicEstimate,
}

/// Result of the optional optimization stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub optimized_parameters: PolicyParameters,
    /// Score of the current simulation metrics (higher is better, unbounded)
    pub reward_score: f64,
    pub improvement_percentage: f64,
    pub improvement_basis: ImprovementBasis,
    /// Static comparison figures carried alongside the estimate
    pub comparison_metrics: BTreeMap<String, f64>,
    pub method: String,
    /// Perturbation applied to budget, enforcement, timeline, tax, subsidy
    pub applied_action: [f64; 5],
}

/// Priority tier of a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One advisory record in the explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub recommendation: String,
    pub rationale: String,
    pub action_items: Vec<String>,
}

/// Named factor with its share of influence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

/// Terminal record of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationReport {
    pub narrative: String,
    /// Static per-factor attribution table
    pub attributions: BTreeMap<String, f64>,
    /// Attributions ranked by descending magnitude
    pub feature_importance: Vec<FeatureWeight>,
    pub recommendations: Vec<Recommendation>,
}
