//! Orchestrator - runs a request through the stage sequence
//!
//! See `engine.rs` for the state machine and the pipeline builder.

pub mod engine;

pub use engine::{next_stage, validate_request, Pipeline, PipelineBuilder, PipelineError};
