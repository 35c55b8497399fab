//! Model Artifact Cache
//!
//! Process-lifetime store of loaded predictors keyed by stable artifact id.
//! The cache is an explicit service object: the pipeline owns it behind an
//! `Arc` and hands it to the stages that need a model.
//!
//! # Critical Invariants
//!
//! 1. **Single-flight**: concurrent first calls for the same id perform one load
//! 2. **Never evicts**: once an id resolves, every later call returns the same `Arc`
//! 3. **Per-artifact isolation**: a broken file for one id only affects that id,
//!    which resolves to its seeded fallback
//! 4. **Determinism**: a fallback for `(seed, id)` is identical across processes
//!
//! # Storage format
//!
//! `<model_dir>/<id>.json` holds an [`ArtifactDocument`]. A missing file is the
//! normal "no trained weights" case; unreadable, undecodable or mis-shaped
//! files are logged and replaced by the fallback.

mod predictor;

pub use predictor::{Normalizer, Predictor, RecurrentCell, RegressionTree, TreeEnsemble, TreeNode};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::rng::RngManager;

// ============================================================================
// Artifact identifiers
// ============================================================================

/// Behavior predictor: 10 features → 32 hidden units → 4 indicators
pub const BEHAVIOR_RECURRENT: ArtifactSpec = ArtifactSpec {
    id: "behavior_recurrent",
    shape: ArtifactShape::Recurrent {
        input: 10,
        hidden: 32,
        output: 4,
    },
};

pub const IMPACT_CONGESTION: ArtifactSpec = impact_spec("impact_congestion");
pub const IMPACT_INFLATION: ArtifactSpec = impact_spec("impact_inflation");
pub const IMPACT_DISSATISFACTION: ArtifactSpec = impact_spec("impact_dissatisfaction");
pub const IMPACT_ENERGY: ArtifactSpec = impact_spec("impact_energy");

/// Trees per fallback ensemble
const FALLBACK_TREES: usize = 50;

/// Depth of each fallback tree
const FALLBACK_DEPTH: usize = 3;

const fn impact_spec(id: &'static str) -> ArtifactSpec {
    ArtifactSpec {
        id,
        shape: ArtifactShape::Ensemble { features: 8 },
    }
}

/// Expected dimensions of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactShape {
    Recurrent {
        input: usize,
        hidden: usize,
        output: usize,
    },
    Ensemble {
        features: usize,
    },
}

/// Stable identifier plus the shape a stage expects behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub id: &'static str,
    pub shape: ArtifactShape,
}

impl ArtifactSpec {
    pub fn input_size(&self) -> usize {
        match self.shape {
            ArtifactShape::Recurrent { input, .. } => input,
            ArtifactShape::Ensemble { features } => features,
        }
    }

    /// Seeded default predictor for this id
    pub fn fallback_predictor(&self, seed: u64) -> Predictor {
        let mut rng = RngManager::derived(seed, self.id);
        match self.shape {
            ArtifactShape::Recurrent {
                input,
                hidden,
                output,
            } => Predictor::Recurrent(RecurrentCell::seeded(input, hidden, output, &mut rng)),
            ArtifactShape::Ensemble { features } => Predictor::Ensemble(TreeEnsemble::seeded(
                features,
                FALLBACK_TREES,
                FALLBACK_DEPTH,
                &mut rng,
            )),
        }
    }

    /// Check a decoded document against the expected shape
    fn check(&self, doc: &ArtifactDocument) -> Result<(), ArtifactError> {
        let mismatch = |message: String| ArtifactError::ShapeMismatch {
            id: self.id.to_string(),
            message,
        };

        match (self.shape, &doc.predictor) {
            (
                ArtifactShape::Recurrent {
                    input,
                    hidden,
                    output,
                },
                Predictor::Recurrent(cell),
            ) => {
                if (cell.input_size, cell.hidden_size, cell.output_size) != (input, hidden, output) {
                    return Err(mismatch(format!(
                        "recurrent {}x{}x{}, expected {}x{}x{}",
                        cell.input_size, cell.hidden_size, cell.output_size, input, hidden, output
                    )));
                }
            }
            (ArtifactShape::Ensemble { features }, Predictor::Ensemble(ensemble)) => {
                if ensemble.n_features != features {
                    return Err(mismatch(format!(
                        "ensemble over {} features, expected {}",
                        ensemble.n_features, features
                    )));
                }
            }
            _ => return Err(mismatch("wrong predictor kind".to_string())),
        }

        doc.predictor.validate().map_err(mismatch)?;

        if let Some(normalizer) = &doc.normalizer {
            if normalizer.len() != self.input_size() || normalizer.scale.len() != self.input_size() {
                return Err(mismatch(format!(
                    "normalizer covers {} features, expected {}",
                    normalizer.len(),
                    self.input_size()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Artifact
// ============================================================================

/// Artifact load failure (recovered by the cache, never surfaced to callers)
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact '{id}' from {path}: {source}")]
    Io {
        id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode artifact '{id}': {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact '{id}' has the wrong shape: {message}")]
    ShapeMismatch { id: String, message: String },
}

/// On-disk artifact body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDocument {
    pub predictor: Predictor,
    #[serde(default)]
    pub normalizer: Option<Normalizer>,
}

/// Where an artifact's weights came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ArtifactSource {
    Storage { path: PathBuf, sha256: String },
    Fallback { seed: u64 },
}

/// Loaded predictive model
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub predictor: Predictor,
    pub normalizer: Option<Normalizer>,
    pub source: ArtifactSource,
}

impl Artifact {
    pub fn fallback(spec: &ArtifactSpec, seed: u64) -> Self {
        Self {
            id: spec.id.to_string(),
            predictor: spec.fallback_predictor(seed),
            normalizer: None,
            source: ArtifactSource::Fallback { seed },
        }
    }

    /// Run the predictor, normalizing inputs first when a normalizer is present
    pub fn predict(&self, features: &[f64]) -> Vec<f64> {
        match &self.normalizer {
            Some(normalizer) => self.predictor.predict(&normalizer.transform(features)),
            None => self.predictor.predict(features),
        }
    }

    /// First output, for single-output predictors
    pub fn predict_scalar(&self, features: &[f64]) -> f64 {
        self.predict(features).first().copied().unwrap_or(0.0)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ArtifactSource::Fallback { .. })
    }
}

// ============================================================================
// Cache
// ============================================================================

type Slot = Arc<OnceCell<Arc<Artifact>>>;

/// Single-flight memoizing artifact cache
///
/// # Example
///
/// ```rust
/// use policy_simulator_core_rs::artifacts::{ArtifactCache, IMPACT_ENERGY};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = ArtifactCache::new("does-not-exist", 42);
/// let first = cache.get_or_load(&IMPACT_ENERGY).await;
/// let second = cache.get_or_load(&IMPACT_ENERGY).await;
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// assert_eq!(cache.load_count(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct ArtifactCache {
    model_dir: PathBuf,
    seed: u64,
    slots: Mutex<HashMap<&'static str, Slot>>,
    loads: AtomicUsize,
}

impl ArtifactCache {
    pub fn new(model_dir: impl Into<PathBuf>, seed: u64) -> Self {
        Self {
            model_dir: model_dir.into(),
            seed,
            slots: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Resolve an artifact, loading it on first use
    pub async fn get_or_load(&self, spec: &ArtifactSpec) -> Arc<Artifact> {
        // The map lock is held only long enough to fetch the slot; the load
        // itself runs under the slot's OnceCell.
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(spec.id).or_default())
        };

        slot.get_or_init(|| self.load(spec)).await.clone()
    }

    /// Number of loads performed (one per distinct id)
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Ids that have resolved
    pub fn cached_ids(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.to_string())
            .collect();
        ids.sort();
        ids
    }

    async fn load(&self, spec: &ArtifactSpec) -> Arc<Artifact> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let artifact = match self.read_from_storage(spec).await {
            Ok(Some(artifact)) => {
                info!(model_id = spec.id, "loaded artifact from storage");
                artifact
            }
            Ok(None) => {
                debug!(model_id = spec.id, seed = self.seed, "no stored artifact, using seeded fallback");
                Artifact::fallback(spec, self.seed)
            }
            Err(e) => {
                warn!(model_id = spec.id, error = %e, "artifact load failed, using seeded fallback");
                Artifact::fallback(spec, self.seed)
            }
        };
        Arc::new(artifact)
    }

    async fn read_from_storage(&self, spec: &ArtifactSpec) -> Result<Option<Artifact>, ArtifactError> {
        let path = self.model_dir.join(format!("{}.json", spec.id));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ArtifactError::Io {
                    id: spec.id.to_string(),
                    path,
                    source,
                })
            }
        };

        let doc: ArtifactDocument =
            serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Decode {
                id: spec.id.to_string(),
                source,
            })?;
        spec.check(&doc)?;

        Ok(Some(Artifact {
            id: spec.id.to_string(),
            predictor: doc.predictor,
            normalizer: doc.normalizer,
            source: ArtifactSource::Storage {
                path,
                sha256: format!("{:x}", Sha256::digest(&bytes)),
            },
        }))
    }
}
