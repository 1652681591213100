//! Spendcast Core Library
//!
//! Transaction analytics and forecasting for card spending:
//! - Boundary normalization of CSV/JSON transaction records
//! - Stable category encoding with an explicit unseen fallback
//! - Monthly pivots, multi-key aggregates and outlier clipping
//! - Recurring payment detection (monthly/weekly)
//! - Classify-then-regress merchant spend forecasting over an immutable
//!   model snapshot
//! - Month-over-month trend summaries and increment buckets
//! - Year-in-review summaries and training-set preparation

pub mod aggregate;
pub mod config;
pub mod encoding;
pub mod error;
pub mod forecast;
pub mod import;
pub mod models;
pub mod predictors;
pub mod recurrence;
pub mod snapshot;
pub mod temporal;
pub mod training;
pub mod trend;
pub mod wrapped;

/// Test utilities including mock predictors
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::collections::BTreeMap;

pub use aggregate::{
    monthly_pivot, multi_key_aggregate, AggregateRow, FeatureKey, OutlierClip, PivotRow,
};
pub use config::AnalyticsConfig;
pub use encoding::{CategoryMap, CategoryMaps, UNSEEN};
pub use error::{Error, Result};
pub use forecast::ForecastingPipeline;
pub use import::{load_file, ImportOutcome, InputFormat};
pub use models::{
    AggregationMode, AnnualForecast, ForecastRecord, IncrementBucket, IncrementPrediction,
    MerchantForecast, Periodicity, RecurrencePattern, Transaction, TrendSummary,
};
pub use predictors::{AmountRegressor, IncrementClassifier, PurchaseClassifier};
pub use recurrence::RecurrencePatternDetector;
pub use snapshot::{ModelSnapshot, SnapshotHandle};
pub use temporal::{DateFormat, TemporalFeatures};
pub use training::TrainingCorpus;
pub use trend::{classify_increment_bucket, TrendAnalyzer};
pub use wrapped::YearInReview;

/// Recurring merchants in one client's transactions
pub fn analyze_recurring_payments(
    transactions: &[Transaction],
) -> BTreeMap<String, RecurrencePattern> {
    RecurrencePatternDetector::new().detect(transactions)
}

/// Month-over-month trend over the given transactions
pub fn compute_monthly_trend(transactions: &[Transaction]) -> TrendSummary {
    TrendAnalyzer::new().compute_monthly_trend(transactions)
}

/// Top `k` merchants by aggregated predicted spend
pub fn forecast_top_merchants(
    snapshot: &ModelSnapshot,
    transactions: &[Transaction],
    k: usize,
    mode: AggregationMode,
) -> Result<Vec<MerchantForecast>> {
    ForecastingPipeline::new(snapshot).forecast_top_merchants(transactions, k, mode)
}
