//! Aggregation engine
//!
//! Groups transactions into per-(client, merchant) monthly pivots and
//! per-feature-tuple sums, and clips training amounts at a fixed percentile.
//! Groups are emitted in first-appearance order of their key.

use std::collections::HashMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::encoding::{CategoryMap, CategoryMaps, UNSEEN};
use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::temporal::TemporalFeatures;

/// Column order of the per-transaction model features
pub const FEATURE_NAMES: [&str; 9] = [
    "client_id",
    "merchant_id",
    "category_id",
    "sale_type_id",
    "month",
    "year",
    "weekday",
    "quarter",
    "is_weekend",
];

/// Encoded categorical codes plus calendar features for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    pub client: i64,
    pub merchant: i64,
    pub category: i64,
    pub sale_type: i64,
    pub month: u32,
    pub year: i32,
    pub weekday: u32,
    pub quarter: u32,
    pub is_weekend: bool,
}

impl FeatureKey {
    pub fn from_transaction(tx: &Transaction, maps: &CategoryMaps) -> Self {
        let codes = maps.encode(tx);
        let temporal = TemporalFeatures::from_date(tx.date);
        Self {
            client: codes.client,
            merchant: codes.merchant,
            category: codes.category,
            sale_type: codes.sale_type,
            month: temporal.month,
            year: temporal.year,
            weekday: temporal.weekday,
            quarter: temporal.quarter,
            is_weekend: temporal.is_weekend,
        }
    }

    /// Model input row in [`FEATURE_NAMES`] order
    pub fn to_features(&self) -> Vec<f64> {
        vec![
            self.client as f64,
            self.merchant as f64,
            self.category as f64,
            self.sale_type as f64,
            f64::from(self.month),
            f64::from(self.year),
            f64::from(self.weekday),
            f64::from(self.quarter),
            if self.is_weekend { 1.0 } else { 0.0 },
        ]
    }
}

/// Summed amount and purchase flag for one distinct [`FeatureKey`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: FeatureKey,
    pub amount: f64,
    /// Max over the group of `amount > 0`
    pub purchased: bool,
}

/// Sum amounts per distinct feature tuple
pub fn multi_key_aggregate(transactions: &[Transaction], maps: &CategoryMaps) -> Vec<AggregateRow> {
    let mut index: HashMap<FeatureKey, usize> = HashMap::new();
    let mut rows: Vec<AggregateRow> = Vec::new();

    for tx in transactions {
        let key = FeatureKey::from_transaction(tx, maps);
        let purchased = tx.amount > 0.0;
        match index.get(&key) {
            Some(&i) => {
                rows[i].amount += tx.amount;
                rows[i].purchased |= purchased;
            }
            None => {
                index.insert(key, rows.len());
                rows.push(AggregateRow {
                    key,
                    amount: tx.amount,
                    purchased,
                });
            }
        }
    }

    rows
}

/// Monthly spend of one (client, merchant) pair within a year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    pub client_id: String,
    pub merchant: String,
    /// Summed amount per calendar month, index 0 = January
    pub monthly: [f64; 12],
    /// Most frequent category code in the group
    pub category_id: i64,
    /// Most frequent sale-type code in the group
    pub sale_type_id: i64,
}

impl PivotRow {
    /// Sums for months 1..=`months`, zero-filled
    pub fn month_vector(&self, months: u32) -> Vec<f64> {
        let months = months.min(12) as usize;
        self.monthly[..months].to_vec()
    }

    /// Months 1..=`months` followed by the category and sale-type codes
    pub fn features(&self, months: u32) -> Vec<f64> {
        let mut features = self.month_vector(months);
        features.push(self.category_id as f64);
        features.push(self.sale_type_id as f64);
        features
    }

    /// Spend in `label_month` minus spend in January
    ///
    /// Config validation keeps `label_month` after the feature window, so it
    /// is only ever a label.
    pub fn increment_delta(&self, label_month: u32) -> f64 {
        let index = (label_month.clamp(1, 12) - 1) as usize;
        self.monthly[index] - self.monthly[0]
    }
}

/// Build the per-(client, merchant) monthly pivot for `year`
pub fn monthly_pivot(
    transactions: &[Transaction],
    year: i32,
    categories: &CategoryMap,
    sale_types: &CategoryMap,
) -> Vec<PivotRow> {
    struct Group {
        monthly: [f64; 12],
        categories: Vec<i64>,
        sale_types: Vec<i64>,
    }

    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut keys: Vec<(&str, &str)> = Vec::new();
    let mut groups: Vec<Group> = Vec::new();

    for tx in transactions.iter().filter(|t| t.date.year() == year) {
        let key = (tx.client_id.as_str(), tx.merchant.as_str());
        let i = *index.entry(key).or_insert_with(|| {
            keys.push(key);
            groups.push(Group {
                monthly: [0.0; 12],
                categories: Vec::new(),
                sale_types: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[i];
        group.monthly[(tx.date.month() - 1) as usize] += tx.amount;
        group.categories.push(categories.encode(&tx.merchant_category));
        group.sale_types.push(sale_types.encode(&tx.sale_type));
    }

    keys.into_iter()
        .zip(groups)
        .map(|((client, merchant), group)| PivotRow {
            client_id: client.to_string(),
            merchant: merchant.to_string(),
            monthly: group.monthly,
            category_id: mode(&group.categories).unwrap_or(UNSEEN),
            sale_type_id: mode(&group.sale_types).unwrap_or(UNSEEN),
        })
        .collect()
}

/// Most frequent value; ties go to the value encountered first
pub fn mode(values: &[i64]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for v in values {
        *counts.entry(*v).or_insert(0) += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for v in values {
        let count = counts[v];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((*v, count));
        }
    }
    best.map(|(v, _)| v)
}

/// Upper clip at a percentile computed once over the training population
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierClip {
    pub threshold: f64,
}

impl OutlierClip {
    /// Compute the `quantile` (0..=1) of `amounts` with linear interpolation
    pub fn fit(amounts: &[f64], quantile: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&quantile) {
            return Err(Error::InvalidData(format!(
                "quantile must be within [0, 1], got {}",
                quantile
            )));
        }
        if amounts.is_empty() {
            return Err(Error::InvalidData(
                "cannot compute a clip threshold over no amounts".into(),
            ));
        }

        let mut sorted = amounts.to_vec();
        sorted.sort_by(f64::total_cmp);

        let position = quantile * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let fraction = position - lower as f64;
        let threshold = sorted[lower] + (sorted[upper] - sorted[lower]) * fraction;

        Ok(Self { threshold })
    }

    pub fn clip(&self, amount: f64) -> f64 {
        amount.min(self.threshold)
    }

    /// Clip every row's amount in place
    pub fn apply(&self, rows: &mut [AggregateRow]) {
        for row in rows {
            row.amount = self.clip(row.amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tx;

    #[test]
    fn test_monthly_pivot_zero_fills_missing_months() {
        let transactions = vec![
            tx("C1", "2022-01-10", "X", 50.0),
            tx("C1", "2022-03-02", "X", 30.0),
        ];
        let categories = CategoryMap::build(["general"]);
        let sale_types = CategoryMap::build(["physical"]);

        let pivot = monthly_pivot(&transactions, 2022, &categories, &sale_types);
        assert_eq!(pivot.len(), 1);
        assert_eq!(pivot[0].client_id, "C1");
        assert_eq!(pivot[0].merchant, "X");
        assert_eq!(
            pivot[0].month_vector(7),
            vec![50.0, 0.0, 30.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_monthly_pivot_filters_year_and_excludes_month_eight_from_features() {
        let transactions = vec![
            tx("C1", "2022-01-10", "X", 10.0),
            tx("C1", "2022-01-20", "X", 15.0),
            tx("C1", "2022-08-01", "X", 100.0),
            tx("C1", "2021-01-10", "X", 999.0),
        ];
        let map = CategoryMap::build(["general"]);
        let pivot = monthly_pivot(&transactions, 2022, &map, &map);

        let features = pivot[0].features(7);
        assert_eq!(features.len(), 9);
        assert_eq!(features[0], 25.0);
        assert!(!features[..7].contains(&100.0));
        assert_eq!(pivot[0].increment_delta(8), 75.0);
    }

    #[test]
    fn test_monthly_pivot_mode_encoding() {
        let mut a = tx("C1", "2022-01-01", "X", 1.0);
        a.merchant_category = "food".into();
        let mut b = tx("C1", "2022-02-01", "X", 1.0);
        b.merchant_category = "fuel".into();
        let mut c = tx("C1", "2022-03-01", "X", 1.0);
        c.merchant_category = "fuel".into();
        c.sale_type = "never-seen".into();

        let categories = CategoryMap::build(["food", "fuel"]);
        let sale_types = CategoryMap::build(["physical"]);
        let pivot = monthly_pivot(&[a, b, c], 2022, &categories, &sale_types);

        assert_eq!(pivot[0].category_id, 1);
        // two "physical" vs one unseen
        assert_eq!(pivot[0].sale_type_id, 0);
    }

    #[test]
    fn test_mode_ties_go_to_first_encountered() {
        assert_eq!(mode(&[3, 1, 1, 3]), Some(3));
        assert_eq!(mode(&[2, 5, 5]), Some(5));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn test_multi_key_aggregate_groups_regardless_of_order() {
        let transactions = vec![
            tx("C1", "2022-01-03", "X", 10.0),
            tx("C1", "2022-01-04", "X", 5.0),
            tx("C1", "2022-01-03", "X", -10.0),
            tx("C1", "2022-01-03", "X", 0.0),
        ];
        let maps = CategoryMaps::from_corpus(&transactions);

        let rows = multi_key_aggregate(&transactions, &maps);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, 0.0);
        assert!(rows[0].purchased);
        assert_eq!(rows[1].amount, 5.0);

        let mut reversed = transactions.clone();
        reversed.reverse();
        let rows_rev = multi_key_aggregate(&reversed, &maps);
        let find = |rows: &[AggregateRow], key: &FeatureKey| {
            rows.iter().find(|r| &r.key == key).map(|r| (r.amount, r.purchased))
        };
        for row in &rows {
            assert_eq!(find(&rows_rev, &row.key), Some((row.amount, row.purchased)));
        }
    }

    #[test]
    fn test_multi_key_aggregate_unseen_codes() {
        let transactions = vec![tx("C9", "2022-05-07", "NEW", 20.0)];
        let rows = multi_key_aggregate(&transactions, &CategoryMaps::default());
        let key = rows[0].key;
        assert_eq!(key.client, UNSEEN);
        assert_eq!(key.merchant, UNSEEN);
        assert_eq!(key.category, UNSEEN);
        assert_eq!(key.sale_type, UNSEEN);
        // 2022-05-07 is a Saturday
        assert_eq!(key.to_features()[4..], [5.0, 2022.0, 5.0, 2.0, 1.0]);
    }

    #[test]
    fn test_outlier_clip_fixed_threshold() {
        let training: Vec<f64> = (1..=100).map(f64::from).collect();
        let clip = OutlierClip::fit(&training, 0.95).unwrap();
        assert!((clip.threshold - 95.05).abs() < 1e-9);

        assert_eq!(clip.clip(500.0), clip.threshold);
        assert_eq!(clip.clip(10.0), 10.0);
    }

    #[test]
    fn test_outlier_clip_rejects_bad_input() {
        assert!(OutlierClip::fit(&[], 0.95).is_err());
        assert!(OutlierClip::fit(&[1.0], 1.5).is_err());
        assert_eq!(OutlierClip::fit(&[7.0], 0.95).unwrap().threshold, 7.0);
    }
}
