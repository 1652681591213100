//! Forecasting pipeline
//!
//! Classify-then-regress over per-transaction feature rows:
//! 1. Encode each transaction with the snapshot's category maps (unseen -> -1)
//! 2. The classifier decides "will purchase"; the regressor predicts the
//!    amount in log1p space
//! 3. Predicted amount = `exp_m1(regressor)` when the decision is positive,
//!    otherwise 0. The mask is hard; probabilities never blend amounts
//! 4. Aggregate per (client, merchant) with the requested mode and rank
//!    merchants per client, descending, ties in input order
//!
//! Clients appear in the order they first appear in the input.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use tracing::debug;

use crate::aggregate::{monthly_pivot, FeatureKey};
use crate::config::ForecastConfig;
use crate::error::{Error, Result};
use crate::models::{
    month_label, round2, AggregationMode, AnnualForecast, ForecastRecord, IncrementPrediction,
    MerchantForecast, MonthlyAmount, Transaction,
};
use crate::snapshot::ModelSnapshot;

const DEFAULT_FEATURE_MONTHS: u32 = 7;

/// Model outputs for one transaction row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowPrediction {
    pub probability: f64,
    pub will_purchase: bool,
    /// Masked amount: 0 unless `will_purchase`
    pub amount: f64,
}

/// Runs the snapshot's predictors over transactions
pub struct ForecastingPipeline<'a> {
    snapshot: &'a ModelSnapshot,
    config: ForecastConfig,
    feature_months: u32,
}

impl<'a> ForecastingPipeline<'a> {
    pub fn new(snapshot: &'a ModelSnapshot) -> Self {
        Self::with_config(snapshot, ForecastConfig::default())
    }

    pub fn with_config(snapshot: &'a ModelSnapshot, config: ForecastConfig) -> Self {
        Self {
            snapshot,
            config,
            feature_months: DEFAULT_FEATURE_MONTHS,
        }
    }

    /// Number of leading months fed to the increment classifier
    pub fn with_feature_months(mut self, months: u32) -> Self {
        self.feature_months = months;
        self
    }

    /// Per-row probability, decision and masked amount, in input order
    pub fn score_rows(&self, transactions: &[Transaction]) -> Result<Vec<RowPrediction>> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let maps = self.snapshot.maps();
        let rows: Vec<Vec<f64>> = transactions
            .iter()
            .map(|tx| FeatureKey::from_transaction(tx, maps).to_features())
            .collect();

        let n = rows.len();
        let (decisions, probabilities) = self.snapshot.classifier().predict_with_proba(&rows)?;
        let decisions = expect_len(decisions, n)?;
        let probabilities = expect_len(probabilities, n)?;
        let raw = expect_len(self.snapshot.regressor().predict(&rows)?, n)?;
        let clip = self.snapshot.clip();

        Ok(decisions
            .into_iter()
            .zip(probabilities)
            .zip(raw)
            .map(|((will_purchase, probability), log_amount)| {
                let amount = if will_purchase {
                    let amount = log_amount.exp_m1();
                    clip.map_or(amount, |c| c.clip(amount))
                } else {
                    0.0
                };
                RowPrediction {
                    probability,
                    will_purchase,
                    amount,
                }
            })
            .collect())
    }

    /// Rank merchants per client by aggregated masked amount, keeping the top `k`
    pub fn rank_merchants(
        &self,
        transactions: &[Transaction],
        k: usize,
        mode: AggregationMode,
    ) -> Result<Vec<ForecastRecord>> {
        let predictions = self.score_rows(transactions)?;
        Ok(rank_predictions(transactions, &predictions, k, mode))
    }

    /// Top `k` merchants with their aggregated predicted amount
    pub fn forecast_top_merchants(
        &self,
        transactions: &[Transaction],
        k: usize,
        mode: AggregationMode,
    ) -> Result<Vec<MerchantForecast>> {
        Ok(self
            .rank_merchants(transactions, k, mode)?
            .into_iter()
            .map(|record| MerchantForecast {
                client_id: record.client_id,
                merchant: record.merchant,
                amount: record.predicted_amount,
            })
            .collect())
    }

    /// Single-batch prediction with the configured top-k and mode
    pub fn predict_batch(&self, transactions: &[Transaction]) -> Result<Vec<ForecastRecord>> {
        self.rank_merchants(transactions, self.config.batch_top_k, self.config.batch_mode)
    }

    /// Next-year forecast: top merchants scaled to a year plus per-month totals
    pub fn annual_forecast(&self, transactions: &[Transaction]) -> Result<AnnualForecast> {
        if transactions.is_empty() {
            return Ok(AnnualForecast::default());
        }

        let predictions = self.score_rows(transactions)?;
        let top_merchants = rank_predictions(
            transactions,
            &predictions,
            self.config.annual_top_k,
            self.config.annual_mode,
        )
        .into_iter()
        .map(|record| MerchantForecast {
            client_id: record.client_id,
            merchant: record.merchant,
            amount: round2(record.predicted_amount * self.config.annualize_factor),
        })
        .collect();

        let mut by_month: BTreeMap<u32, f64> = BTreeMap::new();
        for (tx, prediction) in transactions.iter().zip(&predictions) {
            *by_month.entry(tx.date.month()).or_insert(0.0) += prediction.amount;
        }

        let total = round2(by_month.values().sum());
        let monthly_totals = by_month
            .into_iter()
            .map(|(month, amount)| MonthlyAmount {
                month,
                label: month_label(month),
                amount: round2(amount),
            })
            .collect();

        Ok(AnnualForecast {
            top_merchants,
            monthly_totals,
            total,
        })
    }

    /// Increment-bucket probabilities per (client, merchant) for `year`
    ///
    /// Pivot codes come from the snapshot's maps. Probabilities are percent,
    /// rounded to 2 decimals, in the model's class order.
    pub fn predict_increment(
        &self,
        transactions: &[Transaction],
        year: i32,
    ) -> Result<Vec<IncrementPrediction>> {
        let model = self.snapshot.increment_model()?;
        let expected = self.feature_months as usize + 2;
        if model.n_features() != expected {
            return Err(Error::FeatureShape {
                expected,
                actual: model.n_features(),
            });
        }

        let maps = self.snapshot.maps();
        let pivot = monthly_pivot(transactions, year, &maps.category, &maps.sale_type);
        if pivot.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<Vec<f64>> = pivot
            .iter()
            .map(|row| row.features(self.feature_months))
            .collect();
        let probabilities = expect_len(model.predict_proba(&rows)?, rows.len())?;
        let classes = model.classes();

        pivot
            .into_iter()
            .zip(probabilities)
            .map(|(row, proba)| {
                let proba = expect_len(proba, classes.len())?;
                Ok(IncrementPrediction {
                    client_id: row.client_id,
                    merchant: row.merchant,
                    probabilities: classes
                        .iter()
                        .cloned()
                        .zip(proba.into_iter().map(|p| round2(p * 100.0)))
                        .collect(),
                })
            })
            .collect()
    }
}

/// Group scored rows per (client, merchant) and keep each client's top `k`
fn rank_predictions(
    transactions: &[Transaction],
    predictions: &[RowPrediction],
    k: usize,
    mode: AggregationMode,
) -> Vec<ForecastRecord> {
    struct Group<'t> {
        client: &'t str,
        merchant: &'t str,
        amounts: Vec<f64>,
        probabilities: Vec<f64>,
    }

    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for (tx, prediction) in transactions.iter().zip(predictions) {
        let key = (tx.client_id.as_str(), tx.merchant.as_str());
        let i = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                client: key.0,
                merchant: key.1,
                amounts: Vec::new(),
                probabilities: Vec::new(),
            });
            groups.len() - 1
        });
        groups[i].amounts.push(prediction.amount);
        groups[i].probabilities.push(prediction.probability);
    }

    let mut client_order: Vec<&str> = Vec::new();
    let mut by_client: HashMap<&str, Vec<(usize, f64)>> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        let ranked = by_client.entry(group.client).or_insert_with(|| {
            client_order.push(group.client);
            Vec::new()
        });
        ranked.push((i, mode.apply(&group.amounts)));
    }

    let mut records = Vec::new();
    for client in client_order {
        let mut ranked = by_client.remove(client).unwrap_or_default();
        // Stable: equal amounts keep first-appearance order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (i, amount)) in ranked.into_iter().take(k).enumerate() {
            let group = &groups[i];
            records.push(ForecastRecord {
                client_id: group.client.to_string(),
                merchant: group.merchant.to_string(),
                purchase_probability: AggregationMode::Mean.apply(&group.probabilities),
                predicted_amount: amount,
                rank: rank + 1,
            });
        }
    }

    debug!(
        "Ranked {} (client, merchant) groups into {} forecast records (k={}, mode={})",
        groups.len(),
        records.len(),
        k,
        mode
    );
    records
}

/// Reject a prediction vector whose length differs from its input
fn expect_len<T>(values: Vec<T>, expected: usize) -> Result<Vec<T>> {
    if values.len() != expected {
        return Err(Error::FeatureShape {
            expected,
            actual: values.len(),
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::aggregate::{OutlierClip, FEATURE_NAMES};
    use crate::encoding::CategoryMaps;
    use crate::predictors::AmountRegressor;
    use crate::test_utils::{
        mock_snapshot, snapshot_json, snapshot_with, tx, FixedClassifier, FixedIncrement,
        RowClassifier, RowRegressor, ShortRegressor,
    };

    /// Regressor that counts how often it is asked to predict
    struct CountingRegressor {
        calls: Arc<AtomicUsize>,
    }

    impl AmountRegressor for CountingRegressor {
        fn n_features(&self) -> usize {
            FEATURE_NAMES.len()
        }

        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![10f64.ln_1p(); rows.len()])
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_no_purchase_masks_every_amount() {
        let snapshot = mock_snapshot(false, 5000.0);
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c1", "2022-01-05", "A", 10.0),
            tx("c1", "2022-02-05", "B", 20.0),
            tx("c2", "2022-03-05", "A", 30.0),
        ];

        let top = pipeline
            .forecast_top_merchants(&transactions, 3, AggregationMode::Sum)
            .unwrap();
        assert_eq!(top.len(), 3);
        assert!(top.iter().all(|m| m.amount == 0.0));

        let annual = pipeline.annual_forecast(&transactions).unwrap();
        assert_eq!(annual.total, 0.0);
        assert!(annual.top_merchants.iter().all(|m| m.amount == 0.0));
    }

    #[test]
    fn test_empty_input_yields_empty_forecast() {
        let snapshot = mock_snapshot(true, 100.0);
        let pipeline = ForecastingPipeline::new(&snapshot);

        assert!(pipeline
            .forecast_top_merchants(&[], 5, AggregationMode::Mean)
            .unwrap()
            .is_empty());
        let annual = pipeline.annual_forecast(&[]).unwrap();
        assert!(annual.top_merchants.is_empty());
        assert_eq!(annual.total, 0.0);
    }

    #[test]
    fn test_ranking_uses_masked_amounts() {
        let transactions = vec![
            tx("c1", "2022-01-05", "A", 1.0),
            tx("c1", "2022-01-06", "B", 1.0),
            tx("c1", "2022-01-07", "C", 1.0),
            tx("c1", "2022-01-08", "D", 1.0),
        ];
        // Merchant codes follow first appearance: A=0, B=1, C=2, D=3
        let snapshot = snapshot_with(
            CategoryMaps::from_corpus(&transactions),
            RowClassifier {
                buys: |row| row[1] != 1.0,
            },
            RowRegressor {
                amount: |row| (row[1] + 1.0) * 10.0,
            },
        );
        let pipeline = ForecastingPipeline::new(&snapshot);

        let top = pipeline
            .forecast_top_merchants(&transactions, 3, AggregationMode::Sum)
            .unwrap();
        let merchants: Vec<&str> = top.iter().map(|m| m.merchant.as_str()).collect();
        assert_eq!(merchants, vec!["D", "C", "A"]);
        assert_close(top[0].amount, 40.0);
        assert_close(top[2].amount, 10.0);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let snapshot = mock_snapshot(true, 10.0);
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c1", "2022-01-05", "ZETA", 1.0),
            tx("c1", "2022-01-06", "ALPHA", 1.0),
            tx("c1", "2022-01-07", "MID", 1.0),
        ];

        let top = pipeline
            .forecast_top_merchants(&transactions, 2, AggregationMode::Mean)
            .unwrap();
        let merchants: Vec<&str> = top.iter().map(|m| m.merchant.as_str()).collect();
        assert_eq!(merchants, vec!["ZETA", "ALPHA"]);
    }

    #[test]
    fn test_aggregation_mode_is_a_parameter() {
        let snapshot = mock_snapshot(true, 10.0);
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c1", "2022-01-05", "A", 1.0),
            tx("c1", "2022-02-05", "A", 1.0),
        ];

        let sum = pipeline
            .forecast_top_merchants(&transactions, 1, AggregationMode::Sum)
            .unwrap();
        let mean = pipeline
            .forecast_top_merchants(&transactions, 1, AggregationMode::Mean)
            .unwrap();
        assert_close(sum[0].amount, 20.0);
        assert_close(mean[0].amount, 10.0);
    }

    #[test]
    fn test_predict_batch_ranks_per_client() {
        let snapshot = mock_snapshot(true, 10.0);
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c2", "2022-01-05", "A", 1.0),
            tx("c1", "2022-01-05", "A", 1.0),
            tx("c1", "2022-01-06", "B", 1.0),
            tx("c1", "2022-01-07", "B", 1.0),
            tx("c1", "2022-01-08", "C", 1.0),
            tx("c1", "2022-01-09", "D", 1.0),
        ];

        let records = pipeline.predict_batch(&transactions).unwrap();
        // c2 first (first appearance), then c1 capped at three merchants
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].client_id, "c2");
        assert_eq!(records[0].rank, 1);
        assert_eq!(records[1].client_id, "c1");
        assert_eq!(records[1].merchant, "B");
        assert_close(records[1].predicted_amount, 20.0);
        assert_close(records[1].purchase_probability, 0.9);
        let ranks: Vec<usize> = records[1..].iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_annual_forecast_scales_mean_and_totals_months() {
        let snapshot = mock_snapshot(true, 100.0);
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c1", "2022-01-05", "M", 1.0),
            tx("c1", "2022-01-20", "N", 1.0),
            tx("c1", "2022-02-05", "M", 1.0),
        ];

        let annual = pipeline.annual_forecast(&transactions).unwrap();
        assert_eq!(annual.top_merchants.len(), 2);
        assert_close(annual.top_merchants[0].amount, 1200.0);
        assert_eq!(annual.monthly_totals.len(), 2);
        assert_eq!(annual.monthly_totals[0].label, "January");
        assert_close(annual.monthly_totals[0].amount, 200.0);
        assert_close(annual.monthly_totals[1].amount, 100.0);
        assert_close(annual.total, 300.0);
    }

    #[test]
    fn test_wrong_prediction_length_aborts() {
        let snapshot = snapshot_with(
            CategoryMaps::default(),
            FixedClassifier::new(true, 0.9),
            ShortRegressor,
        );
        let pipeline = ForecastingPipeline::new(&snapshot);
        let result = pipeline.predict_batch(&[
            tx("c1", "2022-01-05", "A", 1.0),
            tx("c1", "2022-01-06", "B", 1.0),
        ]);
        assert!(matches!(
            result,
            Err(Error::FeatureShape {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_unseen_categories_encode_to_minus_one() {
        let snapshot = snapshot_with(
            CategoryMaps::default(),
            RowClassifier {
                buys: |row| row[..4].iter().all(|code| *code == -1.0),
            },
            RowRegressor { amount: |_| 7.0 },
        );
        let pipeline = ForecastingPipeline::new(&snapshot);
        let scored = pipeline
            .score_rows(&[tx("new-client", "2022-06-01", "NEW", 1.0)])
            .unwrap();
        assert!(scored[0].will_purchase);
        assert_close(scored[0].amount, 7.0);
    }

    #[test]
    fn test_predict_increment_percentages() {
        let snapshot = mock_snapshot(true, 1.0).with_increment_model(Arc::new(FixedIncrement {
            classes: vec!["high".into(), "low".into(), "moderate".into(), "stable".into()],
            probabilities: vec![0.125, 0.5, 0.375, 0.0],
            width: 9,
        }));
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c1", "2022-01-05", "A", 10.0),
            tx("c1", "2022-02-05", "B", 10.0),
            tx("c1", "2021-02-05", "C", 10.0),
        ];

        let predictions = pipeline.predict_increment(&transactions, 2022).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].merchant, "A");
        assert_eq!(
            predictions[0].probabilities,
            vec![
                ("high".to_string(), 12.5),
                ("low".to_string(), 50.0),
                ("moderate".to_string(), 37.5),
                ("stable".to_string(), 0.0),
            ]
        );
    }

    #[test]
    fn test_predict_increment_from_loaded_snapshot() {
        let snapshot = ModelSnapshot::from_slice(snapshot_json().as_bytes()).unwrap();
        let pipeline = ForecastingPipeline::new(&snapshot);
        let predictions = pipeline
            .predict_increment(&[tx("c1", "2022-03-01", "NETFLIX", 15.0)], 2022)
            .unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0].probabilities.iter().all(|(_, p)| *p == 25.0));
    }

    #[test]
    fn test_predict_increment_without_model_is_missing_model() {
        let snapshot = mock_snapshot(true, 1.0);
        let pipeline = ForecastingPipeline::new(&snapshot);
        let result = pipeline.predict_increment(&[tx("c1", "2022-01-05", "A", 1.0)], 2022);
        assert!(matches!(result, Err(Error::MissingModel(_))));
    }

    #[test]
    fn test_snapshot_clip_above_prediction_keeps_amount() {
        let snapshot = ModelSnapshot::from_slice(snapshot_json().as_bytes()).unwrap();
        let pipeline = ForecastingPipeline::new(&snapshot);
        let scored = pipeline
            .score_rows(&[tx("c1", "2022-03-01", "NETFLIX", 15.0)])
            .unwrap();
        // Leaf predicts log1p(100); threshold 500 leaves it untouched
        assert_close(scored[0].amount, 100.0);
    }

    #[test]
    fn test_snapshot_clip_caps_predicted_amounts() {
        let snapshot = mock_snapshot(true, 1000.0).with_clip(OutlierClip { threshold: 250.0 });
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c1", "2022-03-01", "A", 15.0),
            tx("c1", "2022-04-01", "A", 15.0),
        ];

        let scored = pipeline.score_rows(&transactions).unwrap();
        assert_eq!(scored[0].amount, 250.0);

        let top = pipeline
            .forecast_top_merchants(&transactions, 1, AggregationMode::Sum)
            .unwrap();
        assert_eq!(top[0].amount, 500.0);
    }

    #[test]
    fn test_annual_forecast_keeps_client_per_entry() {
        let snapshot = mock_snapshot(true, 10.0);
        let pipeline = ForecastingPipeline::new(&snapshot);
        let transactions = vec![
            tx("c1", "2022-01-05", "A", 1.0),
            tx("c2", "2022-01-06", "A", 1.0),
        ];

        let annual = pipeline.annual_forecast(&transactions).unwrap();
        let entries: Vec<(&str, &str)> = annual
            .top_merchants
            .iter()
            .map(|m| (m.client_id.as_str(), m.merchant.as_str()))
            .collect();
        assert_eq!(entries, vec![("c1", "A"), ("c2", "A")]);
        assert!(annual.top_merchants.iter().all(|m| m.amount == 120.0));
    }

    #[test]
    fn test_annual_forecast_scores_rows_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let snapshot = snapshot_with(
            CategoryMaps::default(),
            FixedClassifier::new(true, 0.9),
            CountingRegressor {
                calls: Arc::clone(&calls),
            },
        );
        let pipeline = ForecastingPipeline::new(&snapshot);

        let annual = pipeline
            .annual_forecast(&[
                tx("c1", "2022-01-05", "A", 1.0),
                tx("c1", "2022-02-05", "B", 1.0),
            ])
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_close(annual.total, 20.0);
    }
}
