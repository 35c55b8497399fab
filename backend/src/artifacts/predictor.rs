//! Predictor implementations carried by artifacts.
//!
//! Two families:
//! - `RecurrentCell`: one LSTM step from a zero state, linear head, sigmoid
//!   outputs. Used for behavior prediction.
//! - `TreeEnsemble`: additive boosted regression trees. Used for impact
//!   forecasting.
//!
//! Both serialize to the on-disk artifact format and can be seeded
//! deterministically when no stored weights exist.

use serde::{Deserialize, Serialize};

use crate::rng::RngManager;

/// Trained (or seeded) model behind an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predictor {
    Recurrent(RecurrentCell),
    Ensemble(TreeEnsemble),
}

impl Predictor {
    pub fn input_size(&self) -> usize {
        match self {
            Predictor::Recurrent(cell) => cell.input_size,
            Predictor::Ensemble(ensemble) => ensemble.n_features,
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            Predictor::Recurrent(cell) => cell.output_size,
            Predictor::Ensemble(_) => 1,
        }
    }

    pub fn predict(&self, features: &[f64]) -> Vec<f64> {
        match self {
            Predictor::Recurrent(cell) => cell.forward(features),
            Predictor::Ensemble(ensemble) => vec![ensemble.predict(features)],
        }
    }

    /// Internal consistency of the stored weights
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Predictor::Recurrent(cell) => cell.validate(),
            Predictor::Ensemble(ensemble) => ensemble.validate(),
        }
    }
}

// ============================================================================
// Recurrent cell
// ============================================================================

/// Single-step LSTM cell with a sigmoid-activated linear head
///
/// Gate rows follow the input, forget, cell, output ordering. With a zero
/// initial state the forget gate and recurrent weights do not contribute, so
/// only input weights are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentCell {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    /// (4 * hidden) x input, row-major
    pub w_ih: Vec<f64>,
    /// 4 * hidden
    pub b_ih: Vec<f64>,
    /// output x hidden, row-major
    pub w_out: Vec<f64>,
    /// output
    pub b_out: Vec<f64>,
}

impl RecurrentCell {
    /// Uniform(-1/sqrt(hidden), 1/sqrt(hidden)) initialisation
    pub fn seeded(input_size: usize, hidden_size: usize, output_size: usize, rng: &mut RngManager) -> Self {
        let k = 1.0 / (hidden_size as f64).sqrt();
        let mut draw = |n: usize| -> Vec<f64> { (0..n).map(|_| rng.uniform(-k, k)).collect() };

        let w_ih = draw(4 * hidden_size * input_size);
        let b_ih = draw(4 * hidden_size);
        let w_out = draw(output_size * hidden_size);
        let b_out = draw(output_size);

        Self {
            input_size,
            hidden_size,
            output_size,
            w_ih,
            b_ih,
            w_out,
            b_out,
        }
    }

    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        let h_size = self.hidden_size;
        let gate = |row: usize| -> f64 {
            let weights = &self.w_ih[row * self.input_size..(row + 1) * self.input_size];
            self.b_ih[row] + dot(weights, x)
        };

        let hidden: Vec<f64> = (0..h_size)
            .map(|j| {
                let input_gate = sigmoid(gate(j));
                let cell_candidate = gate(2 * h_size + j).tanh();
                let output_gate = sigmoid(gate(3 * h_size + j));
                output_gate * (input_gate * cell_candidate).tanh()
            })
            .collect();

        (0..self.output_size)
            .map(|o| {
                let weights = &self.w_out[o * h_size..(o + 1) * h_size];
                sigmoid(self.b_out[o] + dot(weights, &hidden))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        let expected = [
            ("w_ih", self.w_ih.len(), 4 * self.hidden_size * self.input_size),
            ("b_ih", self.b_ih.len(), 4 * self.hidden_size),
            ("w_out", self.w_out.len(), self.output_size * self.hidden_size),
            ("b_out", self.b_out.len(), self.output_size),
        ];
        for (name, actual, wanted) in expected {
            if actual != wanted {
                return Err(format!("{} has {} weights, expected {}", name, actual, wanted));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Boosted trees
// ============================================================================

/// Node of a regression tree, addressed by index into `RegressionTree::nodes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn seeded(n_features: usize, depth: usize, rng: &mut RngManager) -> Self {
        let mut nodes = Vec::new();
        Self::grow(&mut nodes, n_features, depth, rng);
        Self { nodes }
    }

    fn grow(nodes: &mut Vec<TreeNode>, n_features: usize, depth: usize, rng: &mut RngManager) -> usize {
        let index = nodes.len();
        if depth == 0 {
            nodes.push(TreeNode::Leaf {
                value: rng.uniform(-0.5, 0.5),
            });
            return index;
        }

        let feature = rng.range(0, n_features as i64) as usize;
        let threshold = rng.next_f64();
        // Placeholder, patched once both children exist
        nodes.push(TreeNode::Leaf { value: 0.0 });
        let left = Self::grow(nodes, n_features, depth - 1, rng);
        let right = Self::grow(nodes, n_features, depth - 1, rng);
        nodes[index] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    fn predict(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        // Children always sit after their parent, so the walk terminates
        while let Some(node) = self.nodes.get(index) {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = x.get(*feature).copied().unwrap_or(0.0);
                    index = if value < *threshold { *left } else { *right };
                }
            }
        }
        0.0
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {} splits on feature {} of {}", i, feature, n_features));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {} has invalid child {}", i, child));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Additive ensemble: `base_score + learning_rate * Σ tree(x)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
}

impl TreeEnsemble {
    pub fn seeded(n_features: usize, n_trees: usize, depth: usize, rng: &mut RngManager) -> Self {
        let trees = (0..n_trees)
            .map(|_| RegressionTree::seeded(n_features, depth, rng))
            .collect();
        Self {
            n_features,
            base_score: 0.5,
            learning_rate: 0.1,
            trees,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        self.base_score + self.learning_rate * sum
    }

    fn validate(&self) -> Result<(), String> {
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(self.n_features))
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Standard-score input normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Normalizer {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, v)| {
                let mean = self.mean.get(i).copied().unwrap_or(0.0);
                let scale = match self.scale.get(i).copied() {
                    Some(s) if s != 0.0 => s,
                    _ => 1.0,
                };
                (v - mean) / scale
            })
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recurrent_outputs_are_probabilities() {
        let mut rng = RngManager::new(42);
        let cell = RecurrentCell::seeded(10, 32, 4, &mut rng);
        assert!(cell.validate().is_ok());

        let out = cell.forward(&[100.0, 0.25, 0.7, 0.15, 5.0, 2.0, 0.5, 0.88, 0.96, 1.0]);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|v| *v > 0.0 && *v < 1.0));
    }

    #[test]
    fn test_seeded_ensemble_is_reproducible() {
        let a = TreeEnsemble::seeded(8, 50, 3, &mut RngManager::new(7));
        let b = TreeEnsemble::seeded(8, 50, 3, &mut RngManager::new(7));
        assert_eq!(a, b);
        assert!(a.validate().is_ok());

        let x = [0.5, 0.4, 0.3, 0.7, 100.0, 0.7, 0.25, 5.0];
        assert_eq!(a.predict(&x), b.predict(&x));
    }

    #[test]
    fn test_tree_rejects_backward_child() {
        let tree = RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 0,
                    right: 1,
                },
                TreeNode::Leaf { value: 1.0 },
            ],
        };
        assert!(tree.validate(1).is_err());
    }

    #[test]
    fn test_single_split_routes_by_threshold() {
        let tree = RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 1,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: -1.0 },
                TreeNode::Leaf { value: 1.0 },
            ],
        };
        assert_eq!(tree.predict(&[9.0, 0.2]), -1.0);
        assert_eq!(tree.predict(&[9.0, 0.8]), 1.0);
    }

    #[test]
    fn test_normalizer_ignores_zero_scale() {
        let n = Normalizer {
            mean: vec![1.0, 2.0],
            scale: vec![2.0, 0.0],
        };
        assert_eq!(n.transform(&[3.0, 5.0]), vec![1.0, 3.0]);
    }

    #[test]
    fn test_predictor_roundtrips_through_tagged_json() {
        let predictor = Predictor::Ensemble(TreeEnsemble::seeded(8, 2, 1, &mut RngManager::new(1)));
        let json = serde_json::to_value(&predictor).unwrap();
        assert_eq!(json["kind"], "ensemble");
        let back: Predictor = serde_json::from_value(json).unwrap();
        assert_eq!(back, predictor);
    }
}
