//! Deterministic random number generation
//!
//! Uses xorshift64* algorithm for fast, deterministic random number generation.
//! CRITICAL: All randomness in the pipeline MUST go through this module
//! (fallback artifact weights, optimization exploration, heuristic estimates).

mod xorshift;

pub use xorshift::RngManager;
