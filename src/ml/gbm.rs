//! Gradient-boosted-tree scorer
//!
//! Loads a LightGBM-style JSON dump and scores fixed feature vectors. The
//! dump is read once at startup; prediction is a pure tree walk.

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

/// One node of a decision tree. Internal nodes carry a split; leaves carry
/// the additive value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Internal {
        split_feature: usize,
        threshold: f64,
        left_child: Box<TreeNode>,
        right_child: Box<TreeNode>,
    },
    Leaf {
        leaf_value: f64,
    },
}

impl TreeNode {
    /// Descend to a leaf. Features past the end of the slice read as 0.
    fn score(&self, feats: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { leaf_value } => return *leaf_value,
                TreeNode::Internal {
                    split_feature,
                    threshold,
                    left_child,
                    right_child,
                } => {
                    let value = feats.get(*split_feature).copied().unwrap_or(0.0);
                    node = if value <= *threshold {
                        left_child
                    } else {
                        right_child
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TreeInfo {
    tree_structure: TreeNode,
}

/// Parsed model dump
#[derive(Debug, Clone, Deserialize)]
pub struct GbmModel {
    #[serde(default)]
    init_score: f64,
    num_trees: usize,
    tree_info: Vec<TreeInfo>,
}

impl GbmModel {
    /// Load a model dump from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::ModelLoad(format!("{}: {}", path.display(), e)))?;
        let model: GbmModel = serde_json::from_str(&data)
            .map_err(|e| Error::ModelLoad(format!("{}: {}", path.display(), e)))?;

        if model.num_trees != model.tree_info.len() {
            tracing::warn!(
                declared = model.num_trees,
                actual = model.tree_info.len(),
                "Model dump tree count mismatch; using actual"
            );
        }

        Ok(model)
    }

    /// Parse a dump from a JSON string (used by tests and tools)
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ModelLoad(e.to_string()))
    }

    /// Score a feature vector, returning a probability in (0, 1)
    pub fn predict(&self, feats: &[f64]) -> f64 {
        let mut score = self.init_score;
        for tree in &self.tree_info {
            score += tree.tree_structure.score(feats);
        }
        sigmoid(score)
    }
}

/// Logistic function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
