//! Training-set preparation
//!
//! The models themselves are trained outside this crate. This module produces
//! exactly the rows they are trained on, so the feature contract used at
//! inference time and at training time lives in one place:
//!
//! - Purchase/amount models: multi-key aggregates, clipped once at the
//!   training set's quantile, plus synthetic all-unseen rows
//! - Increment model: per (client, merchant) monthly pivots labelled with
//!   the bucket of `month[label_month] - month[1]`
//!
//! Datasets export as JSONL (one row per line) for the trainer.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::{multi_key_aggregate, monthly_pivot, AggregateRow, FeatureKey, OutlierClip};
use crate::config::AggregationConfig;
use crate::encoding::{CategoryMaps, UNSEEN};
use crate::error::Result;
use crate::models::{IncrementBucket, Transaction};
use crate::trend::classify_increment_bucket;

/// Entry point for building the category maps from the training population
pub struct TrainingCorpus;

impl TrainingCorpus {
    /// Client, merchant, category and sale-type maps in first-seen order
    pub fn build_maps(transactions: &[Transaction]) -> CategoryMaps {
        CategoryMaps::from_corpus(transactions)
    }
}

/// One exported training row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub features: Vec<f64>,
    /// Regressor target: `log1p(clipped amount)`, net refunds floored at 0
    pub log_amount: f64,
    /// Classifier target
    pub purchased: bool,
}

impl From<&AggregateRow> for TrainingRow {
    fn from(row: &AggregateRow) -> Self {
        Self {
            features: row.key.to_features(),
            log_amount: row.amount.max(0.0).ln_1p(),
            purchased: row.purchased,
        }
    }
}

/// Aggregated, clipped rows for the purchase classifier and amount regressor
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseDataset {
    /// Training aggregates followed by the synthetic unseen rows
    pub train: Vec<AggregateRow>,
    /// Validation/test aggregates, clipped with the training threshold
    pub holdouts: Vec<Vec<AggregateRow>>,
    pub clip: OutlierClip,
}

impl PurchaseDataset {
    pub fn training_rows(&self) -> Vec<TrainingRow> {
        self.train.iter().map(TrainingRow::from).collect()
    }

    pub fn holdout_rows(&self, index: usize) -> Vec<TrainingRow> {
        self.holdouts
            .get(index)
            .map(|rows| rows.iter().map(TrainingRow::from).collect())
            .unwrap_or_default()
    }

    /// Write the training rows as JSONL
    pub fn write_jsonl<W: Write>(&self, writer: &mut W) -> Result<usize> {
        write_jsonl(writer, &self.training_rows())
    }
}

/// Build the purchase/amount dataset
///
/// The clip threshold is the training set's `clip_quantile`, computed once
/// and reused for every holdout set.
pub fn prepare_purchase_dataset(
    train: &[Transaction],
    holdouts: &[&[Transaction]],
    maps: &CategoryMaps,
    config: &AggregationConfig,
) -> Result<PurchaseDataset> {
    let mut train_rows = multi_key_aggregate(train, maps);
    let amounts: Vec<f64> = train_rows.iter().map(|r| r.amount).collect();
    let clip = OutlierClip::fit(&amounts, config.clip_quantile)?;

    clip.apply(&mut train_rows);
    let refunds = train_rows.iter().filter(|r| r.amount < 0.0).count();
    if refunds > 0 {
        warn!(
            "{} training aggregate(s) net negative after refunds; amount target floored at 0",
            refunds
        );
    }

    let holdouts = holdouts
        .iter()
        .map(|set| {
            let mut rows = multi_key_aggregate(set, maps);
            clip.apply(&mut rows);
            rows
        })
        .collect();

    let aggregated = train_rows.len();
    train_rows.extend(synthetic_unseen_rows(config.reference_year));

    info!(
        "Prepared purchase dataset: {} aggregates + {} synthetic rows, clip at {:.2}",
        aggregated,
        train_rows.len() - aggregated,
        clip.threshold
    );

    Ok(PurchaseDataset {
        train: train_rows,
        holdouts,
        clip,
    })
}

/// All-unseen rows teaching the models that unknown entities do not purchase
///
/// One row per month 1..=12 and weekday 0..=6.
pub fn synthetic_unseen_rows(year: i32) -> Vec<AggregateRow> {
    (1..=12)
        .flat_map(|month| (0..7).map(move |weekday| (month, weekday)))
        .map(|(month, weekday)| AggregateRow {
            key: FeatureKey {
                client: UNSEEN,
                merchant: UNSEEN,
                category: UNSEEN,
                sale_type: UNSEEN,
                month,
                year,
                weekday,
                quarter: (month - 1) / 3 + 1,
                is_weekend: weekday >= 5,
            },
            amount: 0.0,
            purchased: false,
        })
        .collect()
}

/// One labelled row for the increment classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementExample {
    pub client_id: String,
    pub merchant: String,
    /// Months 1..=feature_months, then category and sale-type codes
    pub features: Vec<f64>,
    pub delta: f64,
    pub label: IncrementBucket,
}

/// Build the increment dataset for `config.reference_year`
pub fn prepare_increment_dataset(
    transactions: &[Transaction],
    maps: &CategoryMaps,
    config: &AggregationConfig,
) -> Vec<IncrementExample> {
    monthly_pivot(
        transactions,
        config.reference_year,
        &maps.category,
        &maps.sale_type,
    )
    .into_iter()
    .map(|row| {
        let delta = row.increment_delta(config.label_month);
        IncrementExample {
            features: row.features(config.feature_months),
            label: classify_increment_bucket(delta),
            delta,
            client_id: row.client_id,
            merchant: row.merchant,
        }
    })
    .collect()
}

/// Write rows as JSON lines, returning the number written
pub fn write_jsonl<W: Write, T: Serialize>(writer: &mut W, rows: &[T]) -> Result<usize> {
    for row in rows {
        serde_json::to_writer(&mut *writer, row)?;
        writer.write_all(b"\n")?;
    }
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tx;

    #[test]
    fn test_synthetic_rows_cover_every_month_and_weekday() {
        let rows = synthetic_unseen_rows(2022);
        assert_eq!(rows.len(), 84);
        assert!(rows.iter().all(|r| r.key.client == UNSEEN && r.amount == 0.0 && !r.purchased));

        let december_sunday = rows
            .iter()
            .find(|r| r.key.month == 12 && r.key.weekday == 6)
            .unwrap();
        assert_eq!(december_sunday.key.quarter, 4);
        assert!(december_sunday.key.is_weekend);
    }

    #[test]
    fn test_holdouts_use_training_threshold() {
        // One aggregate per merchant
        let train: Vec<Transaction> = (1..=20)
            .map(|d| tx("c1", "2022-01-03", &format!("M{}", d), f64::from(d)))
            .collect();
        let holdout = vec![tx("c1", "2022-02-01", "M1", 1000.0)];
        let maps = TrainingCorpus::build_maps(&train);

        let dataset =
            prepare_purchase_dataset(&train, &[&holdout], &maps, &AggregationConfig::default())
                .unwrap();

        // quantile 0.95 of 1..=20 with linear interpolation
        assert!((dataset.clip.threshold - 19.05).abs() < 1e-9);
        assert_eq!(dataset.train.len(), 20 + 84);
        assert_eq!(dataset.holdouts[0][0].amount, dataset.clip.threshold);
        assert_eq!(dataset.train[19].amount, dataset.clip.threshold);
    }

    #[test]
    fn test_holdout_unseen_entities_encode_to_minus_one() {
        let train = vec![tx("c1", "2022-01-03", "A", 5.0)];
        let holdout = vec![tx("c2", "2022-01-03", "B", 5.0)];
        let maps = TrainingCorpus::build_maps(&train);

        let dataset =
            prepare_purchase_dataset(&train, &[&holdout], &maps, &AggregationConfig::default())
                .unwrap();
        let rows = dataset.holdout_rows(0);
        assert_eq!(rows[0].features[0], -1.0);
        assert_eq!(rows[0].features[1], -1.0);
        assert_eq!(rows[0].features[2], 0.0);
        assert!(dataset.holdout_rows(1).is_empty());
    }

    #[test]
    fn test_training_rows_use_log1p_target() {
        let train = vec![tx("c1", "2022-01-03", "A", 99.0)];
        let maps = TrainingCorpus::build_maps(&train);
        let dataset =
            prepare_purchase_dataset(&train, &[], &maps, &AggregationConfig::default()).unwrap();

        let rows = dataset.training_rows();
        assert!((rows[0].log_amount - 100f64.ln()).abs() < 1e-9);
        assert!(rows[0].purchased);
        assert_eq!(rows[0].features.len(), 9);

        let mut out = Vec::new();
        assert_eq!(dataset.write_jsonl(&mut out).unwrap(), 85);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 85);
        let first: TrainingRow = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first, rows[0]);
    }

    #[test]
    fn test_net_refund_rows_floor_the_log_target() {
        let train = vec![
            tx("c1", "2022-01-03", "A", 20.0),
            tx("c1", "2022-01-03", "A", -70.0),
        ];
        let maps = TrainingCorpus::build_maps(&train);
        let dataset =
            prepare_purchase_dataset(&train, &[], &maps, &AggregationConfig::default()).unwrap();

        let rows = dataset.training_rows();
        assert_eq!(rows[0].log_amount, 0.0);

        let mut out = Vec::new();
        dataset.write_jsonl(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("null"));
    }

    #[test]
    fn test_increment_dataset_labels_from_month_eight() {
        let transactions = vec![
            tx("c1", "2022-01-10", "A", 100.0),
            tx("c1", "2022-08-10", "A", 200.0),
            tx("c1", "2022-01-10", "B", 100.0),
            tx("c1", "2022-08-10", "B", 95.0),
        ];
        let maps = TrainingCorpus::build_maps(&transactions);
        let examples =
            prepare_increment_dataset(&transactions, &maps, &AggregationConfig::default());

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].features.len(), 9);
        assert_eq!(examples[0].delta, 100.0);
        assert_eq!(examples[0].label, IncrementBucket::High);
        assert_eq!(examples[1].delta, -5.0);
        assert_eq!(examples[1].label, IncrementBucket::Stable);
    }
}
