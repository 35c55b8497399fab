//! PyO3 wrapper for Pipeline
//!
//! # Example (from Python)
//!
//! ```python
//! from policy_simulator_core_rs import PolicyPipeline
//!
//! pipeline = PolicyPipeline({"seed": 7})
//! result = json.loads(pipeline.simulate("Add 2 lanes with a ₹10 crore budget", "Karnataka"))
//! print(result["explanation"]["narrative"])
//! ```

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tokio::runtime::Runtime;

use super::types::{parse_pipeline_config, pipeline_error_to_py};
use crate::models::SimulationRequest;
use crate::orchestrator::Pipeline;

/// Python wrapper owning a pipeline and the runtime that drives it
#[pyclass(name = "PolicyPipeline")]
pub struct PyPolicyPipeline {
    inner: Pipeline,
    runtime: Runtime,
}

#[pymethods]
impl PyPolicyPipeline {
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let config = parse_pipeline_config(config)?;
        let inner = Pipeline::new(config).map_err(pipeline_error_to_py)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                PyErr::new::<PyRuntimeError, _>(format!("Failed to start runtime: {}", e))
            })?;

        Ok(PyPolicyPipeline { inner, runtime })
    }

    /// Run one request and return the final context as JSON
    ///
    /// Raises ValueError for empty text or a blank state.
    #[pyo3(signature = (policy_text, state, enable_optimization=true))]
    fn simulate(
        &self,
        py: Python<'_>,
        policy_text: String,
        state: String,
        enable_optimization: bool,
    ) -> PyResult<String> {
        let request = SimulationRequest::new(policy_text, state).with_optimization(enable_optimization);
        let ctx = py
            .allow_threads(|| self.runtime.block_on(self.inner.run(request)))
            .map_err(pipeline_error_to_py)?;

        serde_json::to_string(&ctx)
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Failed to encode result: {}", e)))
    }

    /// Number of artifact loads performed so far
    fn artifact_loads(&self) -> usize {
        self.inner.cache().load_count()
    }
}
