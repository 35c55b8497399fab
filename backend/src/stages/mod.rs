//! Pipeline Stages
//!
//! Each stage reads the context fields it depends on through the
//! `require_*` accessors and writes exactly one field, its own.
//!
//! | stage | reads | writes |
//! |---|---|---|
//! | extraction | policy_input, region | structured_policy, token_usage |
//! | behavior | structured_policy | behavior_output |
//! | simulation | structured_policy, behavior_output | simulation_metrics |
//! | impact | structured_policy, simulation_metrics | impact_predictions |
//! | optimization | structured_policy, simulation_metrics | optimization_result |
//! | explanation | everything above | explanation |
//!
//! Stages never fail on missing regional data, delegate failure or artifact
//! failure; those paths degrade locally. The only error a stage returns
//! under normal operation is a boundary violation (a dependency not produced).

use async_trait::async_trait;

use crate::models::{SimulationContext, StageId};
use crate::orchestrator::PipelineError;

pub mod behavior;
pub mod explanation;
pub mod extraction;
pub mod impact;
pub mod optimization;
pub mod simulation;

pub use behavior::BehaviorStage;
pub use explanation::ExplanationStage;
pub use extraction::{
    ExtractionDelegate, ExtractionError, ExtractionStage, DelegateResponse, OpenRouterDelegate,
    PatternExtractor,
};
pub use impact::ImpactStage;
pub use optimization::OptimizationStage;
pub use simulation::SimulationStage;

/// One unit of pipeline computation
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Read dependencies from the context and write this stage's field
    async fn run(&self, ctx: &mut SimulationContext) -> Result<(), PipelineError>;
}
