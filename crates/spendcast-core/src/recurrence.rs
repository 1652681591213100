//! Recurring payment detection
//!
//! Detects:
//! - Monthly payments: the same day of month recurring across calendar months
//! - Weekly payments: the same weekday recurring across weeks
//!
//! The monthly test runs first and short-circuits, so a merchant is never
//! reported as both. Merchants passing neither test are left out.
//!
//! Ties on the most frequent day or weekday go to the smallest value.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::config::RecurrenceConfig;
use crate::models::{Periodicity, RecurrencePattern, Transaction};
use crate::temporal::{month_key, week_of_year};

/// Detector configured with the observation threshold
#[derive(Debug, Clone, Default)]
pub struct RecurrencePatternDetector {
    config: RecurrenceConfig,
}

impl RecurrencePatternDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RecurrenceConfig) -> Self {
        Self { config }
    }

    /// Detect recurring merchants in one client's transactions
    pub fn detect(&self, transactions: &[Transaction]) -> BTreeMap<String, RecurrencePattern> {
        let mut by_merchant: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for tx in transactions {
            by_merchant
                .entry(tx.merchant.as_str())
                .or_default()
                .push((tx.date, tx.amount));
        }

        let mut patterns = BTreeMap::new();
        for (merchant, payments) in by_merchant {
            let pattern = self
                .detect_monthly(&payments)
                .or_else(|| self.detect_weekly(&payments));
            if let Some(pattern) = pattern {
                debug!(
                    "Recurring {} payment at {}: day {} x{} @ {:.2}",
                    pattern.periodicity,
                    merchant,
                    pattern.payment_day,
                    pattern.evidence_count,
                    pattern.mean_amount
                );
                patterns.insert(merchant.to_string(), pattern);
            }
        }

        patterns
    }

    /// Detect per client when the input mixes several clients
    pub fn detect_by_client(
        &self,
        transactions: &[Transaction],
    ) -> BTreeMap<String, BTreeMap<String, RecurrencePattern>> {
        let mut by_client: BTreeMap<&str, Vec<Transaction>> = BTreeMap::new();
        for tx in transactions {
            by_client
                .entry(tx.client_id.as_str())
                .or_default()
                .push(tx.clone());
        }

        by_client
            .into_iter()
            .map(|(client, txs)| (client.to_string(), self.detect(&txs)))
            .collect()
    }

    fn detect_monthly(&self, payments: &[(NaiveDate, f64)]) -> Option<RecurrencePattern> {
        let mut months: BTreeMap<(i32, u32), Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for &(date, amount) in payments {
            months.entry(month_key(date)).or_default().push((date, amount));
        }
        if months.len() < self.config.min_observations {
            return None;
        }

        let all: Vec<(NaiveDate, f64)> = months.values().flatten().copied().collect();
        let (day, count) = most_frequent(all.iter().map(|(date, _)| date.day()))?;
        if count < self.config.min_observations {
            return None;
        }

        let on_day: Vec<f64> = all
            .iter()
            .filter(|(date, _)| date.day() == day)
            .map(|(_, amount)| *amount)
            .collect();
        let total_spent: f64 = all.iter().map(|(_, amount)| amount).sum();

        Some(RecurrencePattern {
            periodicity: Periodicity::Monthly,
            payment_day: day,
            mean_amount: mean(&on_day),
            evidence_count: on_day.len(),
            total_spent,
            monthly_average: total_spent / months.len() as f64,
        })
    }

    fn detect_weekly(&self, payments: &[(NaiveDate, f64)]) -> Option<RecurrencePattern> {
        let mut weeks: BTreeMap<(i32, u32), Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for &(date, amount) in payments {
            weeks.entry(week_of_year(date)).or_default().push((date, amount));
        }
        weeks.retain(|_, txs| !txs.is_empty());
        if weeks.len() < self.config.min_observations {
            return None;
        }

        let all: Vec<(NaiveDate, f64)> = weeks.values().flatten().copied().collect();
        let weekday_of = |date: &NaiveDate| date.weekday().num_days_from_monday();
        let (weekday, count) = most_frequent(all.iter().map(|(date, _)| weekday_of(date)))?;
        if count < self.config.min_observations {
            return None;
        }

        let on_weekday: Vec<f64> = all
            .iter()
            .filter(|(date, _)| weekday_of(date) == weekday)
            .map(|(_, amount)| *amount)
            .collect();
        let total_spent: f64 = all.iter().map(|(_, amount)| amount).sum();
        let months_covered = weeks.len() as f64 / self.config.weeks_per_month;

        Some(RecurrencePattern {
            periodicity: Periodicity::Weekly,
            payment_day: weekday,
            mean_amount: mean(&on_weekday),
            evidence_count: on_weekday.len(),
            total_spent,
            monthly_average: total_spent / months_covered,
        })
    }
}

/// Rank patterns by mean amount (descending), ties by merchant name
pub fn top_recurring(
    patterns: &BTreeMap<String, RecurrencePattern>,
    n: usize,
) -> Vec<(String, RecurrencePattern)> {
    let mut ranked: Vec<(String, RecurrencePattern)> = patterns
        .iter()
        .map(|(merchant, pattern)| (merchant.clone(), pattern.clone()))
        .collect();
    // BTreeMap iteration already orders by name; a stable sort keeps it for ties
    ranked.sort_by(|a, b| b.1.mean_amount.total_cmp(&a.1.mean_amount));
    ranked.truncate(n);
    ranked
}

/// Most frequent value and its count; ties go to the smallest value
fn most_frequent(values: impl Iterator<Item = u32>) -> Option<(u32, usize)> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut best: Option<(u32, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
