//! Predictor contracts
//!
//! The forecasting pipeline consumes trained models only through the traits
//! below. Training happens elsewhere; what ships with a snapshot is an
//! exported gradient-boosted tree ensemble ([`TreeEnsemble`]) wrapped as a
//! classifier or regressor.
//!
//! Every predictor reports the feature width it was trained with, and every
//! prediction call rejects rows of a different width.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Binary "will this row be a purchase" model
pub trait PurchaseClassifier: Send + Sync {
    /// Feature width the model was trained with
    fn n_features(&self) -> usize;

    /// Probability of the positive ("will purchase") class per row
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Hard decision per row
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<bool>> {
        Ok(self
            .predict_proba(rows)?
            .into_iter()
            .map(|p| p >= 0.5)
            .collect())
    }

    /// Decisions and probabilities together
    ///
    /// Override when both come from one pass over the model.
    fn predict_with_proba(&self, rows: &[Vec<f64>]) -> Result<(Vec<bool>, Vec<f64>)> {
        Ok((self.predict(rows)?, self.predict_proba(rows)?))
    }
}

/// Amount model trained on `log1p(amount)`; callers invert with `exp_m1`
pub trait AmountRegressor: Send + Sync {
    fn n_features(&self) -> usize;

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;
}

/// Multi-class model over increment-bucket labels
pub trait IncrementClassifier: Send + Sync {
    fn n_features(&self) -> usize;

    /// Class labels, in the column order of `predict_proba`
    fn classes(&self) -> &[String];

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;
}

/// Reject rows whose width differs from what the model expects
pub fn check_width(rows: &[Vec<f64>], expected: usize) -> Result<()> {
    match rows.iter().find(|row| row.len() != expected) {
        Some(row) => Err(Error::FeatureShape {
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

/// One node of an exported regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `row[feature] <= threshold` go left
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

/// A regression tree stored as a flat node list with the root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    pub fn evaluate(&self, row: &[f64]) -> Result<f64> {
        let mut index = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).copied().ok_or(Error::FeatureShape {
                        expected: feature + 1,
                        actual: row.len(),
                    })?;
                    index = if x <= *threshold { *left } else { *right };
                }
                None => break,
            }
        }
        Err(Error::InvalidData(format!(
            "tree does not reach a leaf from node {}",
            index
        )))
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidData("tree has no nodes".into()));
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
                    return Err(Error::FeatureShape {
                        expected: n_features,
                        actual: feature + 1,
                    });
                }
                if *left <= i
                    || *right <= i
                    || *left >= self.nodes.len()
                    || *right >= self.nodes.len()
                {
                    return Err(Error::InvalidData(format!(
                        "node {} has out-of-order children {} and {}",
                        i, left, right
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Additive tree ensemble: `init + learning_rate * sum(trees)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    #[serde(default)]
    pub init: f64,
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
}

impl TreeEnsemble {
    /// Check every split references a valid feature and forward child
    pub fn validate(&self) -> Result<()> {
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(self.n_features))
    }

    pub fn raw_score(&self, row: &[f64]) -> Result<f64> {
        let mut score = self.init;
        for tree in &self.trees {
            score += self.learning_rate * tree.evaluate(row)?;
        }
        Ok(score)
    }

    fn raw_scores(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        check_width(rows, self.n_features)?;
        rows.iter().map(|row| self.raw_score(row)).collect()
    }
}

fn default_decision_threshold() -> f64 {
    0.5
}

/// Binary classifier: sigmoid over the ensemble's log-odds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedClassifier {
    pub ensemble: TreeEnsemble,
    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,
}

impl BoostedClassifier {
    pub fn new(ensemble: TreeEnsemble) -> Self {
        Self {
            ensemble,
            decision_threshold: default_decision_threshold(),
        }
    }
}

impl PurchaseClassifier for BoostedClassifier {
    fn n_features(&self) -> usize {
        self.ensemble.n_features
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(self
            .ensemble
            .raw_scores(rows)?
            .into_iter()
            .map(sigmoid)
            .collect())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<bool>> {
        Ok(self.predict_with_proba(rows)?.0)
    }

    fn predict_with_proba(&self, rows: &[Vec<f64>]) -> Result<(Vec<bool>, Vec<f64>)> {
        let probabilities = self.predict_proba(rows)?;
        let decisions = probabilities
            .iter()
            .map(|p| *p >= self.decision_threshold)
            .collect();
        Ok((decisions, probabilities))
    }
}

/// Regressor: the ensemble's raw score, in log1p space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedRegressor {
    pub ensemble: TreeEnsemble,
}

impl AmountRegressor for BoostedRegressor {
    fn n_features(&self) -> usize {
        self.ensemble.n_features
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.ensemble.raw_scores(rows)
    }
}

/// Multi-class classifier: one ensemble per class, softmax over raw scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedMulticlass {
    pub classes: Vec<String>,
    pub ensembles: Vec<TreeEnsemble>,
}

impl BoostedMulticlass {
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() || self.classes.len() != self.ensembles.len() {
            return Err(Error::InvalidData(format!(
                "{} classes but {} ensembles",
                self.classes.len(),
                self.ensembles.len()
            )));
        }
        let width = self.ensembles[0].n_features;
        for ensemble in &self.ensembles {
            if ensemble.n_features != width {
                return Err(Error::FeatureShape {
                    expected: width,
                    actual: ensemble.n_features,
                });
            }
            ensemble.validate()?;
        }
        Ok(())
    }
}

impl IncrementClassifier for BoostedMulticlass {
    fn n_features(&self) -> usize {
        self.ensembles.first().map_or(0, |e| e.n_features)
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let per_class: Vec<Vec<f64>> = self
            .ensembles
            .iter()
            .map(|e| e.raw_scores(rows))
            .collect::<Result<_>>()?;

        Ok((0..rows.len())
            .map(|i| softmax(&per_class.iter().map(|scores| scores[i]).collect::<Vec<_>>()))
            .collect())
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
