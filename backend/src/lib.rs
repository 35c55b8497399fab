//! Policy Simulator Core - Rust Engine
//!
//! Turns a free-text public policy and an Indian state/UT into a structured
//! impact forecast with an explanation, through a fixed stage sequence.
//!
//! # Architecture
//!
//! - **models**: Request, context and the per-stage records
//! - **stages**: Extraction, behavior, simulation, impact, optimization, explanation
//! - **orchestrator**: Stage state machine and pipeline builder
//! - **artifacts**: Single-flight cache of predictor artifacts
//! - **region**: Regional baseline provider (census, traffic, economics)
//! - **config**: Layered configuration (defaults, TOML, environment)
//! - **rng**: Deterministic random number generation
//! - **telemetry**: `tracing` subscriber setup for binaries
//!
//! # Critical Invariants
//!
//! 1. Each stage writes exactly one context field, never re-runs
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Unknown regions degrade to fixed fallbacks, never to errors
//! 4. FFI boundary is minimal and safe

// Module declarations
pub mod artifacts;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod region;
pub mod rng;
pub mod stages;
pub mod telemetry;

// Re-exports for convenience
pub use artifacts::{Artifact, ArtifactCache, ArtifactSpec};
pub use config::PipelineConfig;
pub use models::{
    ExplanationReport, ImpactIndicators, OptimizationOutcome, PolicyParameters, PolicyType, Region,
    SimulationContext, SimulationMetrics, SimulationRequest, StageId,
};
pub use orchestrator::{Pipeline, PipelineBuilder, PipelineError};
pub use region::{RegionalDataProvider, StaticRegionalData};
pub use rng::RngManager;
pub use stages::Stage;

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn policy_simulator_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::pipeline::PyPolicyPipeline>()?;
    Ok(())
}
