//! Type conversion utilities for FFI boundary

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::config::PipelineConfig;
use crate::orchestrator::PipelineError;

/// Map a pipeline error onto the matching Python exception
pub fn pipeline_error_to_py(err: PipelineError) -> PyErr {
    match err {
        PipelineError::InvalidRequest(_) | PipelineError::InvalidConfig(_) => {
            PyErr::new::<PyValueError, _>(err.to_string())
        }
        PipelineError::MissingField { .. } | PipelineError::Stage { .. } => {
            PyErr::new::<PyRuntimeError, _>(err.to_string())
        }
    }
}

fn extract_optional<'py, T>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Option<T>>
where
    T: FromPyObject<'py>,
{
    match dict.get_item(key)? {
        Some(value) => Ok(Some(value.extract()?)),
        None => Ok(None),
    }
}

/// Build a config from an optional flat dict of overrides
///
/// Recognised keys: `model_dir`, `seed`, `training_timesteps`, `horizon`,
/// `learning_rate`. Anything else is ignored.
pub fn parse_pipeline_config(py_config: Option<&Bound<'_, PyDict>>) -> PyResult<PipelineConfig> {
    let mut config = PipelineConfig::default();
    let Some(dict) = py_config else {
        return Ok(config);
    };

    if let Some(dir) = extract_optional::<String>(dict, "model_dir")? {
        config.artifacts.model_dir = dir.into();
    }
    if let Some(seed) = extract_optional::<u64>(dict, "seed")? {
        config.artifacts.seed = seed;
        config.optimization.seed = seed;
    }
    if let Some(steps) = extract_optional::<usize>(dict, "training_timesteps")? {
        config.optimization.training_timesteps = steps;
    }
    if let Some(horizon) = extract_optional::<usize>(dict, "horizon")? {
        config.optimization.horizon = horizon;
    }
    if let Some(lr) = extract_optional::<f64>(dict, "learning_rate")? {
        config.optimization.learning_rate = lr;
    }

    config.validate().map_err(pipeline_error_to_py)?;
    Ok(config)
}
