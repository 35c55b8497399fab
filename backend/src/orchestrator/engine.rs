//! Pipeline engine
//!
//! Drives one `SimulationContext` through the stage sequence.
//!
//! # Stage sequence
//!
//! ```text
//! extraction → behavior → simulation → impact ─┬─ (optimization on) → optimization ─┐
//!                                              └─ (optimization off) ───────────────┴→ explanation
//! ```
//!
//! `next_stage` is the whole graph: a pure function from the current position
//! to the next one, with a single decision point after impact.
//!
//! # Critical Invariants
//!
//! 1. **Validated input**: empty text or a missing/blank region is rejected
//!    before a context exists
//! 2. **No re-entry**: each stage runs at most once per request, in order
//! 3. **Local recovery**: provider, artifact and delegate failures never reach
//!    the caller
//! 4. **Shared cache**: every pipeline built from the same `ArtifactCache`
//!    reuses its artifacts

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::artifacts::ArtifactCache;
use crate::config::{ExtractionMode, PipelineConfig};
use crate::models::{ContextError, Region, SimulationContext, SimulationRequest, StageId};
use crate::region::{RegionalDataProvider, StaticRegionalData};
use crate::stages::{
    BehaviorStage, ExplanationStage, ExtractionDelegate, ExtractionStage, ImpactStage,
    OpenRouterDelegate, OptimizationStage, SimulationStage, Stage,
};

// ============================================================================
// Errors
// ============================================================================

/// Caller-visible pipeline failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Malformed top-level input (empty text, missing region)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration validation error
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A stage ran before the field it reads was produced
    #[error("stage '{stage}' requires '{field}' but it has not been produced")]
    MissingField { stage: StageId, field: &'static str },

    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: StageId, message: String },
}

impl From<ContextError> for PipelineError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::MissingField { stage, field } => PipelineError::MissingField { stage, field },
        }
    }
}

// ============================================================================
// Stage graph
// ============================================================================

/// Stage that follows `current` (`None` = before the first stage)
///
/// ```rust
/// use policy_simulator_core_rs::models::StageId;
/// use policy_simulator_core_rs::orchestrator::next_stage;
///
/// assert_eq!(next_stage(None, true), Some(StageId::Extraction));
/// assert_eq!(next_stage(Some(StageId::Impact), true), Some(StageId::Optimization));
/// assert_eq!(next_stage(Some(StageId::Impact), false), Some(StageId::Explanation));
/// assert_eq!(next_stage(Some(StageId::Explanation), true), None);
/// ```
pub fn next_stage(current: Option<StageId>, enable_optimization: bool) -> Option<StageId> {
    match current {
        None => Some(StageId::Extraction),
        Some(StageId::Extraction) => Some(StageId::Behavior),
        Some(StageId::Behavior) => Some(StageId::Simulation),
        Some(StageId::Simulation) => Some(StageId::Impact),
        Some(StageId::Impact) if enable_optimization => Some(StageId::Optimization),
        Some(StageId::Impact) => Some(StageId::Explanation),
        Some(StageId::Optimization) => Some(StageId::Explanation),
        Some(StageId::Explanation) => None,
    }
}

/// Check the boundary input and split it into context inputs
pub fn validate_request(request: &SimulationRequest) -> Result<(String, Region), PipelineError> {
    if request.policy_input.trim().is_empty() {
        return Err(PipelineError::InvalidRequest(
            "policy_input must not be empty".to_string(),
        ));
    }

    let region = request
        .region
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidRequest("region is required".to_string()))?;
    let state = region.state.trim();
    if state.is_empty() {
        return Err(PipelineError::InvalidRequest(
            "region.state must not be blank".to_string(),
        ));
    }

    Ok((request.policy_input.clone(), Region::new(state)))
}

// ============================================================================
// Pipeline
// ============================================================================

/// Assembles a `Pipeline` with optional injected collaborators
pub struct PipelineBuilder {
    config: PipelineConfig,
    cache: Option<Arc<ArtifactCache>>,
    provider: Option<Arc<dyn RegionalDataProvider>>,
    delegate: Option<Arc<dyn ExtractionDelegate>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cache: None,
            provider: None,
            delegate: None,
        }
    }

    /// Share an existing artifact cache
    pub fn with_cache(mut self, cache: Arc<ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn RegionalDataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use this delegate for extraction regardless of the configured mode
    pub fn with_delegate(mut self, delegate: Arc<dyn ExtractionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let config = self.config;
        if self.delegate.is_none() {
            config.validate()?;
        } else {
            let mut relaxed = config.clone();
            relaxed.extraction.mode = ExtractionMode::Deterministic;
            relaxed.validate()?;
        }

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(ArtifactCache::new(
                config.artifacts.model_dir.clone(),
                config.artifacts.seed,
            ))
        });
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(StaticRegionalData::new()));

        let extraction = match (self.delegate, config.extraction.mode) {
            (Some(delegate), _) => ExtractionStage::delegated(delegate),
            (None, ExtractionMode::Delegated) => {
                let delegate = OpenRouterDelegate::new(&config.extraction)
                    .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
                ExtractionStage::delegated(Arc::new(delegate))
            }
            (None, ExtractionMode::Deterministic) => ExtractionStage::deterministic(),
        };

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(extraction),
            Box::new(BehaviorStage::new(Arc::clone(&cache), Arc::clone(&provider))),
            Box::new(SimulationStage::new(Arc::clone(&provider))),
            Box::new(ImpactStage::new(Arc::clone(&cache), Arc::clone(&provider))),
            Box::new(OptimizationStage::new(config.optimization.clone())),
            Box::new(ExplanationStage::new(Arc::clone(&provider))),
        ];

        Ok(Pipeline {
            config,
            cache,
            stages,
        })
    }
}

/// Policy simulation pipeline
///
/// Cheap to share behind an `Arc`; concurrent `run` calls are independent
/// apart from the artifact cache.
///
/// # Example
///
/// ```rust
/// use policy_simulator_core_rs::config::PipelineConfig;
/// use policy_simulator_core_rs::models::SimulationRequest;
/// use policy_simulator_core_rs::orchestrator::Pipeline;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
/// let request = SimulationRequest::new("Add 10 bus routes", "Kerala").with_optimization(false);
/// let ctx = pipeline.run(request).await.unwrap();
///
/// assert!(ctx.explanation().is_some());
/// assert!(ctx.optimization_result().is_none());
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    cache: Arc<ArtifactCache>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Build with default collaborators
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        PipelineBuilder::new(config).build()
    }

    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    fn stage(&self, id: StageId) -> Result<&dyn Stage, PipelineError> {
        self.stages
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.as_ref())
            .ok_or_else(|| PipelineError::Stage {
                stage: id,
                message: "stage not registered".to_string(),
            })
    }

    /// Run one request to completion and hand back the final context
    pub async fn run(&self, request: SimulationRequest) -> Result<SimulationContext, PipelineError> {
        let (policy_input, region) = validate_request(&request)?;
        let mut ctx = SimulationContext::new(policy_input, region, request.enable_optimization);

        info!(
            request_id = %ctx.request_id,
            region = ctx.region().id(),
            optimization = ctx.enable_optimization,
            "pipeline started"
        );

        let mut current = None;
        while let Some(id) = next_stage(current, ctx.enable_optimization) {
            debug!(request_id = %ctx.request_id, stage = %id, "running stage");
            self.stage(id)?.run(&mut ctx).await?;
            ctx.record_stage(id);
            current = Some(id);
        }

        info!(
            request_id = %ctx.request_id,
            stages = ctx.stage_trace().len(),
            "pipeline finished"
        );
        Ok(ctx)
    }
}
