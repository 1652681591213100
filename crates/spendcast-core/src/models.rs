//! Domain models for spendcast

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single card transaction, already normalized at the import boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The client (card holder) the transaction belongs to
    pub client_id: String,
    pub date: NaiveDate,
    pub merchant: String,
    pub merchant_category: String,
    pub sale_type: String,
    /// Blank amounts are normalized to 0.0, never missing
    pub amount: f64,
}

impl Transaction {
    pub fn new(
        client_id: impl Into<String>,
        date: NaiveDate,
        merchant: impl Into<String>,
        merchant_category: impl Into<String>,
        sale_type: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            date,
            merchant: merchant.into(),
            merchant_category: merchant_category.into(),
            sale_type: sale_type.into(),
            amount,
        }
    }
}

/// Recurring payment cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Monthly,
    Weekly,
}

impl Periodicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
        }
    }
}

impl std::fmt::Display for Periodicity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Periodicity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "weekly" => Ok(Self::Weekly),
            _ => Err(format!("Unknown periodicity: {}", s)),
        }
    }
}

/// A detected recurring payment for one merchant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub periodicity: Periodicity,
    /// Day of month (1-31) for monthly patterns, weekday (0=Mon..6=Sun) for weekly ones
    pub payment_day: u32,
    /// Mean amount of the transactions that fell on `payment_day`
    pub mean_amount: f64,
    /// Number of transactions on `payment_day` backing the pattern
    pub evidence_count: usize,
    /// Total spent at the merchant across the qualifying buckets
    pub total_spent: f64,
    /// Estimated spend per month at the merchant
    pub monthly_average: f64,
}

/// How per-row predicted amounts are combined per (client, merchant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    Mean,
    #[default]
    Sum,
}

impl AggregationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
        }
    }

    /// Combine a group of values; empty groups combine to 0
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let total: f64 = values.iter().sum();
        match self {
            Self::Sum => total,
            Self::Mean => total / values.len() as f64,
        }
    }
}

impl std::fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(Self::Mean),
            "sum" | "total" => Ok(Self::Sum),
            _ => Err(format!("Unknown aggregation mode: {}", s)),
        }
    }
}

/// A ranked forecast for one (client, merchant) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub client_id: String,
    pub merchant: String,
    /// Mean purchase probability over the pair's rows (0.0-1.0)
    pub purchase_probability: f64,
    /// Aggregated masked amount
    pub predicted_amount: f64,
    /// 1-based rank within the client
    pub rank: usize,
}

/// A merchant and its predicted spend, as returned to the calling layer
///
/// Rankings are per client, so cohort input repeats merchants across clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantForecast {
    pub client_id: String,
    pub merchant: String,
    pub amount: f64,
}

/// Predicted spend for one calendar month across all clients/merchants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAmount {
    pub month: u32,
    pub label: String,
    pub amount: f64,
}

/// Result of the annualized forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnnualForecast {
    /// Top merchants per client with their mean predicted amount scaled to a year
    pub top_merchants: Vec<MerchantForecast>,
    /// Sum of masked predicted amounts per calendar month present in the input
    pub monthly_totals: Vec<MonthlyAmount>,
    /// Sum of `monthly_totals`
    pub total: f64,
}

/// Discretization of a month-over-month spend delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncrementBucket {
    High,
    Moderate,
    Stable,
    Low,
}

impl IncrementBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Stable => "stable",
            Self::Low => "low",
        }
    }

    pub fn all() -> &'static [IncrementBucket] {
        &[Self::High, Self::Moderate, Self::Stable, Self::Low]
    }
}

impl std::fmt::Display for IncrementBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IncrementBucket {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "moderate" => Ok(Self::Moderate),
            "stable" => Ok(Self::Stable),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown increment bucket: {}", s)),
        }
    }
}

/// Increment-bucket probabilities for one (client, merchant) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementPrediction {
    pub client_id: String,
    pub merchant: String,
    /// (class label, probability in percent rounded to 2 decimals), in model class order
    pub probabilities: Vec<(String, f64)>,
}

/// Total spend for one month of the trend series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySpend {
    pub month: u32,
    pub label: String,
    pub amount: f64,
}

/// Change between two consecutive months present in the series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthChange {
    pub from_month: u32,
    pub to_month: u32,
    pub from_label: String,
    pub to_label: String,
    pub previous_amount: f64,
    pub current_amount: f64,
    /// `None` when the previous month's total is zero
    pub change_percent: Option<f64>,
}

/// The largest month-over-month increase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargestIncrease {
    pub from_label: String,
    pub to_label: String,
    pub change_percent: f64,
}

/// Month-over-month trend summary for one year of transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrendSummary {
    pub monthly_spend: Vec<MonthlySpend>,
    pub changes: Vec<MonthChange>,
    /// Unweighted mean over the defined changes (0 when there are none)
    pub average_change_percent: f64,
    /// Mean of the monthly totals (0 for empty input)
    pub average_monthly_amount: f64,
    pub largest_increase: Option<LargestIncrease>,
    /// Quarter (1-4) with the highest sum of percentage changes
    pub most_active_quarter: Option<u32>,
    /// Changes skipped because the previous month's total was zero
    pub undefined_changes: usize,
}

/// English month name for 1-12, or the number itself otherwise
pub fn month_label(month: u32) -> String {
    u8::try_from(month)
        .ok()
        .and_then(|m| chrono::Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| month.to_string())
}

/// Display label for a quarter (1-4)
pub fn quarter_label(quarter: u32) -> &'static str {
    match quarter {
        1 => "Q1 (January-March)",
        2 => "Q2 (April-June)",
        3 => "Q3 (July-September)",
        _ => "Q4 (October-December)",
    }
}

/// Round to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodicity_round_trip_str() {
        assert_eq!("monthly".parse::<Periodicity>(), Ok(Periodicity::Monthly));
        assert_eq!(Periodicity::Weekly.to_string(), "weekly");
        assert!("yearly".parse::<Periodicity>().is_err());
    }

    #[test]
    fn test_aggregation_mode_apply() {
        let values = [2.0, 4.0, 6.0];
        assert_eq!(AggregationMode::Sum.apply(&values), 12.0);
        assert_eq!(AggregationMode::Mean.apply(&values), 4.0);
        assert_eq!(AggregationMode::Mean.apply(&[]), 0.0);
        assert_eq!("avg".parse::<AggregationMode>(), Ok(AggregationMode::Mean));
    }

    #[test]
    fn test_month_label() {
        assert_eq!(month_label(1), "January");
        assert_eq!(month_label(12), "December");
        assert_eq!(month_label(13), "13");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(100.004), 100.0);
        assert_eq!(round2(33.333_333), 33.33);
    }
}
