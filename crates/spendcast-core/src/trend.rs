//! Month-over-month spend trends
//!
//! Totals are computed per calendar month that has transactions; missing
//! months are absent from the series, never zero-filled. Changes are taken
//! between consecutive *present* months. A change whose previous month
//! totals zero is undefined (`None`): it is listed, but excluded from the
//! average, the largest increase and the quarter sums.

use std::collections::BTreeMap;

use chrono::Datelike;
use tracing::debug;

use crate::models::{
    month_label, round2, IncrementBucket, LargestIncrease, MonthChange, MonthlySpend,
    Transaction, TrendSummary,
};

/// Computes [`TrendSummary`] values, optionally restricted to one year
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendAnalyzer {
    year: Option<i32>,
}

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only consider transactions dated in `year`
    pub fn for_year(year: i32) -> Self {
        Self { year: Some(year) }
    }

    pub fn compute_monthly_trend(&self, transactions: &[Transaction]) -> TrendSummary {
        let mut totals: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for tx in transactions
            .iter()
            .filter(|t| self.year.map_or(true, |y| t.date.year() == y))
        {
            *totals.entry((tx.date.year(), tx.date.month())).or_insert(0.0) += tx.amount;
        }

        if totals.is_empty() {
            return TrendSummary::default();
        }

        let monthly_spend: Vec<MonthlySpend> = totals
            .iter()
            .map(|(&(_, month), &amount)| MonthlySpend {
                month,
                label: month_label(month),
                amount: round2(amount),
            })
            .collect();

        let series: Vec<(u32, f64)> = totals.iter().map(|(&(_, m), &a)| (m, a)).collect();
        let changes: Vec<MonthChange> = series
            .windows(2)
            .map(|pair| {
                let (from_month, previous) = pair[0];
                let (to_month, current) = pair[1];
                MonthChange {
                    from_month,
                    to_month,
                    from_label: month_label(from_month),
                    to_label: month_label(to_month),
                    previous_amount: round2(previous),
                    current_amount: round2(current),
                    change_percent: percent_change(previous, current),
                }
            })
            .collect();

        let undefined_changes = changes.iter().filter(|c| c.change_percent.is_none()).count();
        if undefined_changes > 0 {
            debug!(
                "{} month-over-month change(s) undefined (previous month totals zero)",
                undefined_changes
            );
        }

        let defined: Vec<(&MonthChange, f64)> = changes
            .iter()
            .filter_map(|c| c.change_percent.map(|pct| (c, pct)))
            .collect();

        let average_change_percent = if defined.is_empty() {
            0.0
        } else {
            round2(defined.iter().map(|(_, pct)| pct).sum::<f64>() / defined.len() as f64)
        };

        // First maximum wins
        let largest_increase = defined
            .iter()
            .fold(None::<&(&MonthChange, f64)>, |best, item| match best {
                Some(b) if b.1 >= item.1 => Some(b),
                _ => Some(item),
            })
            .map(|(change, pct)| LargestIncrease {
                from_label: change.from_label.clone(),
                to_label: change.to_label.clone(),
                change_percent: *pct,
            });

        let mut quarter_sums: BTreeMap<u32, f64> = BTreeMap::new();
        for (change, pct) in &defined {
            *quarter_sums.entry(quarter_of(change.to_month)).or_insert(0.0) += pct;
        }
        let most_active_quarter = quarter_sums
            .iter()
            .fold(None::<(u32, f64)>, |best, (&quarter, &sum)| match best {
                Some(b) if b.1 >= sum => Some(b),
                _ => Some((quarter, sum)),
            })
            .map(|(quarter, _)| quarter);

        let average_monthly_amount =
            round2(totals.values().sum::<f64>() / totals.len() as f64);

        TrendSummary {
            monthly_spend,
            changes,
            average_change_percent,
            average_monthly_amount,
            largest_increase,
            most_active_quarter,
            undefined_changes,
        }
    }
}

/// `(current - previous) / previous * 100`, rounded to 2 decimals; `None` when previous is zero
fn percent_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some(round2((current - previous) / previous * 100.0))
}

fn quarter_of(month: u32) -> u32 {
    (month + 2) / 3
}

/// Bucket a month-over-month delta: >50 high, >10 moderate, >=-10 stable, else low
pub fn classify_increment_bucket(delta: f64) -> IncrementBucket {
    if delta > 50.0 {
        IncrementBucket::High
    } else if delta > 10.0 {
        IncrementBucket::Moderate
    } else if delta >= -10.0 {
        IncrementBucket::Stable
    } else {
        IncrementBucket::Low
    }
}
