//! Simulation Context
//!
//! The record threaded through the pipeline. One optional slot per stage
//! output; each slot is written only by its owning stage and read by later
//! stages through `require_*` accessors that fail loudly when a dependency
//! has not been produced yet.
//!
//! # Critical Invariants
//!
//! 1. **Append-only**: slots are set, never cleared
//! 2. **Ownership**: each slot has exactly one writer (see `StageId::output_field`)
//! 3. **Immutable input**: `policy_input` and `region` never change after creation

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::indicators::{BehaviorIndicators, ImpactIndicators, SimulationMetrics};
use super::outcome::{ExplanationReport, OptimizationOutcome};
use super::policy::{PolicyParameters, Region, TokenUsage};

/// Pipeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Extraction,
    Behavior,
    Simulation,
    Impact,
    Optimization,
    Explanation,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Extraction => "extraction",
            StageId::Behavior => "behavior",
            StageId::Simulation => "simulation",
            StageId::Impact => "impact",
            StageId::Optimization => "optimization",
            StageId::Explanation => "explanation",
        }
    }

    /// Context field owned by this stage
    pub fn output_field(&self) -> &'static str {
        match self {
            StageId::Extraction => "structured_policy",
            StageId::Behavior => "behavior_output",
            StageId::Simulation => "simulation_metrics",
            StageId::Impact => "impact_predictions",
            StageId::Optimization => "optimization_result",
            StageId::Explanation => "explanation",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-boundary contract violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("stage '{stage}' requires '{field}' but it has not been produced")]
    MissingField { stage: StageId, field: &'static str },
}

/// Plain input accepted at the pipeline boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub policy_input: String,
    pub region: Option<Region>,
    #[serde(default = "default_enable_optimization")]
    pub enable_optimization: bool,
}

fn default_enable_optimization() -> bool {
    true
}

impl SimulationRequest {
    pub fn new(policy_input: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            policy_input: policy_input.into(),
            region: Some(Region::new(state)),
            enable_optimization: true,
        }
    }

    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.enable_optimization = enabled;
        self
    }
}

/// Shared state of one simulation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationContext {
    pub request_id: Uuid,
    policy_input: String,
    region: Region,
    pub enable_optimization: bool,
    pub token_usage: Option<TokenUsage>,
    structured_policy: Option<PolicyParameters>,
    behavior_output: Option<BehaviorIndicators>,
    simulation_metrics: Option<SimulationMetrics>,
    impact_predictions: Option<ImpactIndicators>,
    optimization_result: Option<OptimizationOutcome>,
    explanation: Option<ExplanationReport>,
    /// Stages executed so far, in order
    stage_trace: Vec<StageId>,
}

impl SimulationContext {
    /// Create a context from already-validated input
    pub fn new(policy_input: String, region: Region, enable_optimization: bool) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            policy_input,
            region,
            enable_optimization,
            token_usage: None,
            structured_policy: None,
            behavior_output: None,
            simulation_metrics: None,
            impact_predictions: None,
            optimization_result: None,
            explanation: None,
            stage_trace: Vec::new(),
        }
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn policy_input(&self) -> &str {
        &self.policy_input
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn stage_trace(&self) -> &[StageId] {
        &self.stage_trace
    }

    pub(crate) fn record_stage(&mut self, stage: StageId) {
        self.stage_trace.push(stage);
    }

    // ========================================================================
    // Optional views (for callers and the explanation stage)
    // ========================================================================

    pub fn structured_policy(&self) -> Option<&PolicyParameters> {
        self.structured_policy.as_ref()
    }

    pub fn behavior_output(&self) -> Option<&BehaviorIndicators> {
        self.behavior_output.as_ref()
    }

    pub fn simulation_metrics(&self) -> Option<&SimulationMetrics> {
        self.simulation_metrics.as_ref()
    }

    pub fn impact_predictions(&self) -> Option<&ImpactIndicators> {
        self.impact_predictions.as_ref()
    }

    pub fn optimization_result(&self) -> Option<&OptimizationOutcome> {
        self.optimization_result.as_ref()
    }

    pub fn explanation(&self) -> Option<&ExplanationReport> {
        self.explanation.as_ref()
    }

    // ========================================================================
    // Stage-boundary reads
    // ========================================================================

    pub fn require_structured_policy(
        &self,
        reader: StageId,
    ) -> Result<&PolicyParameters, ContextError> {
        self.structured_policy
            .as_ref()
            .ok_or_else(|| missing(reader, StageId::Extraction))
    }

    pub fn require_behavior_output(
        &self,
        reader: StageId,
    ) -> Result<&BehaviorIndicators, ContextError> {
        self.behavior_output
            .as_ref()
            .ok_or_else(|| missing(reader, StageId::Behavior))
    }

    pub fn require_simulation_metrics(
        &self,
        reader: StageId,
    ) -> Result<&SimulationMetrics, ContextError> {
        self.simulation_metrics
            .as_ref()
            .ok_or_else(|| missing(reader, StageId::Simulation))
    }

    pub fn require_impact_predictions(
        &self,
        reader: StageId,
    ) -> Result<&ImpactIndicators, ContextError> {
        self.impact_predictions
            .as_ref()
            .ok_or_else(|| missing(reader, StageId::Impact))
    }

    // ========================================================================
    // Owner writes
    // ========================================================================

    pub fn set_structured_policy(&mut self, policy: PolicyParameters, usage: TokenUsage) {
        self.structured_policy = Some(policy);
        self.token_usage = Some(usage);
    }

    pub fn set_behavior_output(&mut self, behavior: BehaviorIndicators) {
        self.behavior_output = Some(behavior);
    }

    pub fn set_simulation_metrics(&mut self, metrics: SimulationMetrics) {
        self.simulation_metrics = Some(metrics);
    }

    pub fn set_impact_predictions(&mut self, impact: ImpactIndicators) {
        self.impact_predictions = Some(impact);
    }

    pub fn set_optimization_result(&mut self, outcome: OptimizationOutcome) {
        self.optimization_result = Some(outcome);
    }

    pub fn set_explanation(&mut self, report: ExplanationReport) {
        self.explanation = Some(report);
    }
}

fn missing(reader: StageId, owner: StageId) -> ContextError {
    ContextError::MissingField {
        stage: reader,
        field: owner.output_field(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::policy::PolicyType;

    fn context() -> SimulationContext {
        SimulationContext::new("Add bus routes".to_string(), Region::new("Goa"), false)
    }

    #[test]
    fn test_require_reports_owner_field() {
        let ctx = context();
        let err = ctx.require_simulation_metrics(StageId::Impact).unwrap_err();
        assert_eq!(
            err,
            ContextError::MissingField {
                stage: StageId::Impact,
                field: "simulation_metrics",
            }
        );
        assert!(err.to_string().contains("impact"));
    }

    #[test]
    fn test_writes_do_not_touch_other_slots() {
        let mut ctx = context();
        let policy =
            PolicyParameters::new(PolicyType::Economic, Region::new("Goa"), 1.0, 90, 0.7);
        ctx.set_structured_policy(policy.clone(), TokenUsage::default());
        ctx.set_simulation_metrics(SimulationMetrics::fallback());

        assert_eq!(ctx.structured_policy(), Some(&policy));
        assert!(ctx.behavior_output().is_none());
        assert_eq!(ctx.token_usage, Some(TokenUsage::default()));
        assert_eq!(ctx.policy_input(), "Add bus routes");
    }

    #[test]
    fn test_request_defaults_optimization_on() {
        let request: SimulationRequest =
            serde_json::from_str(r#"{"policy_input": "x", "region": {"state": "Goa"}}"#).unwrap();
        assert!(request.enable_optimization);
    }
}
