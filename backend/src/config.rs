//! Pipeline configuration
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults (`PipelineConfig::default()`)
//! 2. A TOML file
//! 3. `POLICY_SIM_*` environment variables (a `.env` file is honoured)
//!
//! ```toml
//! [extraction]
//! mode = "delegated"
//! model = "arcee-ai/trinity-large-preview:free"
//! timeout_secs = 30
//!
//! [artifacts]
//! model_dir = "models"
//! seed = 42
//!
//! [optimization]
//! training_timesteps = 1000
//! horizon = 10
//! learning_rate = 0.01
//! seed = 42
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::orchestrator::PipelineError;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "arcee-ai/trinity-large-preview:free";
pub const DEFAULT_LOG_FILTER: &str = "policy_simulator_core_rs=info";

/// Extraction strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Pattern extraction only
    Deterministic,
    /// External language model, pattern extraction on failure
    Delegated,
}

impl FromStr for ExtractionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" | "demo" => Ok(ExtractionMode::Deterministic),
            "delegated" | "llm" => Ok(ExtractionMode::Delegated),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown extraction mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub mode: ExtractionMode,
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Deterministic,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory holding `<model_id>.json` files
    pub model_dir: PathBuf,
    /// Seed for fallback artifacts
    pub seed: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Environment interactions spent training the learner
    pub training_timesteps: usize,
    /// Steps per episode
    pub horizon: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            training_timesteps: 1000,
            horizon: 10,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub artifacts: ArtifactConfig,
    pub optimization: OptimizationConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load defaults, then `path` (if given), then the environment, and validate
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let _ = dotenvy::dotenv();

        let config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PipelineError> {
        toml::from_str(content)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid TOML: {}", e)))
    }

    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `POLICY_SIM_*` overrides through an arbitrary variable lookup
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("POLICY_SIM_EXTRACTION_MODE") {
            self.extraction.mode = mode.parse()?;
        }
        if let Some(key) = lookup("POLICY_SIM_API_KEY").or_else(|| lookup("OPENROUTER_API_KEY")) {
            if !key.trim().is_empty() {
                self.extraction.api_key = Some(key);
            }
        }
        if let Some(model) = lookup("POLICY_SIM_MODEL") {
            self.extraction.model = model;
        }
        if let Some(endpoint) = lookup("POLICY_SIM_ENDPOINT") {
            self.extraction.endpoint = endpoint;
        }
        if let Some(timeout) = lookup("POLICY_SIM_TIMEOUT_SECS") {
            self.extraction.timeout_secs = parse_var("POLICY_SIM_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(dir) = lookup("POLICY_SIM_MODEL_DIR") {
            self.artifacts.model_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup("POLICY_SIM_SEED") {
            let seed = parse_var("POLICY_SIM_SEED", &seed)?;
            self.artifacts.seed = seed;
            self.optimization.seed = seed;
        }
        if let Some(steps) = lookup("POLICY_SIM_TRAINING_TIMESTEPS") {
            self.optimization.training_timesteps =
                parse_var("POLICY_SIM_TRAINING_TIMESTEPS", &steps)?;
        }
        if let Some(filter) = lookup("POLICY_SIM_LOG") {
            self.logging.filter = filter;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if self.extraction.timeout_secs == 0 {
            return invalid("extraction.timeout_secs must be positive");
        }
        if self.extraction.mode == ExtractionMode::Delegated && self.extraction.api_key.is_none() {
            return invalid("delegated extraction requires an api_key");
        }
        if self.optimization.horizon == 0 {
            return invalid("optimization.horizon must be positive");
        }
        if self.optimization.training_timesteps == 0 {
            return invalid("optimization.training_timesteps must be positive");
        }
        if !(self.optimization.learning_rate > 0.0 && self.optimization.learning_rate.is_finite()) {
            return invalid("optimization.learning_rate must be positive");
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, PipelineError> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::InvalidConfig(format!("{} has invalid value '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.extraction.mode, ExtractionMode::Deterministic);
        assert_eq!(config.optimization.horizon, 10);
        assert_eq!(config.optimization.training_timesteps, 1000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [optimization]
            horizon = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.optimization.horizon, 5);
        assert_eq!(config.optimization.training_timesteps, 1000);
        assert_eq!(config.artifacts.seed, 42);
    }

    #[test]
    fn test_env_overrides_file() {
        let vars: HashMap<&str, &str> = [
            ("POLICY_SIM_EXTRACTION_MODE", "delegated"),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("POLICY_SIM_SEED", "7"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.extraction.mode, ExtractionMode::Delegated);
        assert_eq!(config.extraction.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.artifacts.seed, 7);
        assert_eq!(config.optimization.seed, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let result = PipelineConfig::default().with_env_overrides(|k| {
            (k == "POLICY_SIM_SEED").then(|| "forty-two".to_string())
        });
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        let mut config = PipelineConfig::default();
        config.optimization.horizon = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.extraction.mode = ExtractionMode::Delegated;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.optimization.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }
}
