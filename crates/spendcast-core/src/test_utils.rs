//! Test utilities for spendcast-core
//!
//! Mock predictors with fixed or row-driven outputs, a transaction builder,
//! and a small serialized snapshot for load/swap tests.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;

use crate::encoding::CategoryMaps;
use crate::error::Result;
use crate::models::Transaction;
use crate::predictors::{check_width, AmountRegressor, IncrementClassifier, PurchaseClassifier};
use crate::snapshot::ModelSnapshot;

const FEATURE_WIDTH: usize = 9;

/// Transaction with category "general" and sale type "physical"
pub fn tx(client: &str, date: &str, merchant: &str, amount: f64) -> Transaction {
    Transaction::new(
        client,
        NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("test date must be YYYY-MM-DD"),
        merchant,
        "general",
        "physical",
        amount,
    )
}

/// Classifier returning the same decision and probability for every row
pub struct FixedClassifier {
    decision: bool,
    probability: f64,
    width: usize,
}

impl FixedClassifier {
    pub fn new(decision: bool, probability: f64) -> Self {
        Self::with_width(decision, probability, FEATURE_WIDTH)
    }

    pub fn with_width(decision: bool, probability: f64, width: usize) -> Self {
        Self {
            decision,
            probability,
            width,
        }
    }
}

impl PurchaseClassifier for FixedClassifier {
    fn n_features(&self) -> usize {
        self.width
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        check_width(rows, self.width)?;
        Ok(vec![self.probability; rows.len()])
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<bool>> {
        check_width(rows, self.width)?;
        Ok(vec![self.decision; rows.len()])
    }
}

/// Classifier deciding per row from its feature vector
pub struct RowClassifier {
    pub buys: fn(&[f64]) -> bool,
}

impl PurchaseClassifier for RowClassifier {
    fn n_features(&self) -> usize {
        FEATURE_WIDTH
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        check_width(rows, FEATURE_WIDTH)?;
        Ok(rows
            .iter()
            .map(|row| if (self.buys)(row) { 0.8 } else { 0.2 })
            .collect())
    }
}

/// Regressor predicting the same amount for every row (stored in log1p space)
pub struct FixedRegressor {
    log_amount: f64,
}

impl FixedRegressor {
    pub fn new(amount: f64) -> Self {
        Self {
            log_amount: amount.ln_1p(),
        }
    }
}

impl AmountRegressor for FixedRegressor {
    fn n_features(&self) -> usize {
        FEATURE_WIDTH
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        check_width(rows, FEATURE_WIDTH)?;
        Ok(vec![self.log_amount; rows.len()])
    }
}

/// Regressor computing the amount per row from its feature vector
pub struct RowRegressor {
    pub amount: fn(&[f64]) -> f64,
}

impl AmountRegressor for RowRegressor {
    fn n_features(&self) -> usize {
        FEATURE_WIDTH
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        check_width(rows, FEATURE_WIDTH)?;
        Ok(rows.iter().map(|row| (self.amount)(row).ln_1p()).collect())
    }
}

/// Regressor that returns one prediction too few
pub struct ShortRegressor;

impl AmountRegressor for ShortRegressor {
    fn n_features(&self) -> usize {
        FEATURE_WIDTH
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(vec![0.0; rows.len().saturating_sub(1)])
    }
}

/// Increment model returning the same distribution for every row
pub struct FixedIncrement {
    pub classes: Vec<String>,
    pub probabilities: Vec<f64>,
    pub width: usize,
}

impl IncrementClassifier for FixedIncrement {
    fn n_features(&self) -> usize {
        self.width
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        check_width(rows, self.width)?;
        Ok(vec![self.probabilities.clone(); rows.len()])
    }
}

/// Snapshot with empty maps and fixed predictors
pub fn mock_snapshot(decision: bool, amount: f64) -> ModelSnapshot {
    ModelSnapshot::new(
        CategoryMaps::default(),
        Arc::new(FixedClassifier::new(decision, if decision { 0.9 } else { 0.1 })),
        Arc::new(FixedRegressor::new(amount)),
    )
    .expect("mock predictors use the standard feature width")
}

/// Snapshot with the given maps and predictors
pub fn snapshot_with(
    maps: CategoryMaps,
    classifier: impl PurchaseClassifier + 'static,
    regressor: impl AmountRegressor + 'static,
) -> ModelSnapshot {
    ModelSnapshot::new(maps, Arc::new(classifier), Arc::new(regressor))
        .expect("mock predictors use the standard feature width")
}

/// A serialized snapshot: always buys, predicts 100.0, four increment classes
pub fn snapshot_json() -> String {
    let leaf = |value: f64| json!({ "nodes": [{ "type": "leaf", "value": value }] });
    let ensemble = |value: f64| {
        json!({
            "n_features": FEATURE_WIDTH,
            "init": 0.0,
            "learning_rate": 1.0,
            "trees": [leaf(value)]
        })
    };

    json!({
        "maps": {
            "client": ["c1"],
            "merchant": ["NETFLIX", "OXXO"],
            "category": ["general"],
            "sale_type": ["physical"]
        },
        "classifier": { "ensemble": ensemble(3.0) },
        "regressor": { "ensemble": ensemble(100f64.ln_1p()) },
        "increment": {
            "classes": ["high", "low", "moderate", "stable"],
            "ensembles": [ensemble(0.0), ensemble(0.0), ensemble(0.0), ensemble(0.0)]
        },
        "clip_threshold": 500.0
    })
    .to_string()
}
