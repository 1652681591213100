//! Year-in-review summaries
//!
//! Pure summaries over one client's transactions. Rankings are stable: equal
//! keys keep the order in which the merchant, category or weekday first
//! appears in the input. Amounts are rounded to cents.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::WrappedConfig;
use crate::models::{round2, Transaction};
use crate::temporal::{month_key, weekday_name};

/// Headline numbers for the year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualSummary {
    pub total_spent: f64,
    /// Distinct calendar days with at least one transaction
    pub transaction_days: usize,
    pub transaction_count: usize,
    pub unique_merchants: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantVisits {
    pub merchant: String,
    pub count: usize,
    pub total: f64,
    /// Category of the merchant's last transaction
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteCategory {
    pub category: String,
    pub purchase_count: usize,
    pub average_spent: f64,
    /// Share of the yearly total in percent (0 when that total is not positive)
    pub share_percent: f64,
    pub total_spent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantAmount {
    pub merchant: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiggestDay {
    pub date: NaiveDate,
    pub total: f64,
    pub top_merchants: Vec<MerchantAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayAverage {
    /// 0=Monday..6=Sunday
    pub weekday: u32,
    pub name: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DailySpending {
    /// Mean of per-day totals
    pub daily_average: f64,
    /// Weekdays with the highest mean transaction amount
    pub top_weekdays: Vec<WeekdayAverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantSpend {
    pub merchant: String,
    pub total_spent: f64,
    /// Total divided by the number of distinct months with spend
    pub monthly_average: f64,
}

/// Every summary for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearInReview {
    pub year: i32,
    pub summary: Option<AnnualSummary>,
    pub top_merchants: Vec<MerchantVisits>,
    pub top_categories: Vec<CategoryCount>,
    pub favorite_category: Option<FavoriteCategory>,
    pub biggest_day: Option<BiggestDay>,
    pub daily_spending: DailySpending,
    pub top_spend: Vec<MerchantSpend>,
}

/// Build every summary for the transactions dated in `year`
pub fn year_in_review(
    transactions: &[Transaction],
    year: i32,
    config: &WrappedConfig,
) -> YearInReview {
    let in_year: Vec<Transaction> = transactions
        .iter()
        .filter(|t| t.date.year() == year)
        .cloned()
        .collect();

    let summary = annual_summary(&in_year);
    let yearly_total = summary.as_ref().map_or(0.0, |s| s.total_spent);

    YearInReview {
        year,
        favorite_category: favorite_category(&in_year, yearly_total),
        summary,
        top_merchants: top_merchants_by_visits(&in_year, config.top_n),
        top_categories: top_categories(&in_year, config.top_n),
        biggest_day: day_most_spent(&in_year),
        daily_spending: average_daily_spending(&in_year),
        top_spend: top_merchants_by_spend(&in_year, config.top_n),
    }
}

pub fn annual_summary(transactions: &[Transaction]) -> Option<AnnualSummary> {
    if transactions.is_empty() {
        return None;
    }

    let days: HashSet<NaiveDate> = transactions.iter().map(|t| t.date).collect();
    let merchants: HashSet<&str> = transactions.iter().map(|t| t.merchant.as_str()).collect();

    Some(AnnualSummary {
        total_spent: round2(transactions.iter().map(|t| t.amount).sum()),
        transaction_days: days.len(),
        transaction_count: transactions.len(),
        unique_merchants: merchants.len(),
    })
}

/// Merchants ranked by number of transactions
pub fn top_merchants_by_visits(transactions: &[Transaction], n: usize) -> Vec<MerchantVisits> {
    let mut ranked: Vec<MerchantVisits> = grouped(transactions, |t| t.merchant.as_str())
        .into_iter()
        .map(|(merchant, txs)| MerchantVisits {
            merchant: merchant.to_string(),
            count: txs.len(),
            total: round2(txs.iter().map(|t| t.amount).sum()),
            category: txs
                .last()
                .map(|t| t.merchant_category.clone())
                .unwrap_or_default(),
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(n);
    ranked
}

/// Categories ranked by number of transactions
pub fn top_categories(transactions: &[Transaction], n: usize) -> Vec<CategoryCount> {
    let mut ranked = category_counts(transactions);
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(n);
    ranked
}

/// The most frequent category, with its share of `yearly_total`
pub fn favorite_category(
    transactions: &[Transaction],
    yearly_total: f64,
) -> Option<FavoriteCategory> {
    // max_by_key returns the last maximum; fold keeps the first
    let favorite = category_counts(transactions)
        .into_iter()
        .fold(None::<CategoryCount>, |best, c| match best {
            Some(b) if b.count >= c.count => Some(b),
            _ => Some(c),
        })?;

    let share_percent = if yearly_total > 0.0 {
        round2(favorite.total / yearly_total * 100.0)
    } else {
        0.0
    };

    Some(FavoriteCategory {
        average_spent: round2(favorite.total / favorite.count as f64),
        purchase_count: favorite.count,
        share_percent,
        total_spent: favorite.total,
        category: favorite.category,
    })
}

/// The calendar day with the highest total and its top 3 merchants
pub fn day_most_spent(transactions: &[Transaction]) -> Option<BiggestDay> {
    let (date, txs, total) = grouped(transactions, |t| t.date)
        .into_iter()
        .map(|(date, txs)| {
            let total: f64 = txs.iter().map(|t| t.amount).sum();
            (date, txs, total)
        })
        .fold(None::<(NaiveDate, Vec<&Transaction>, f64)>, |best, day| match best {
            Some(b) if b.2 >= day.2 => Some(b),
            _ => Some(day),
        })?;

    let mut merchants: Vec<MerchantAmount> = grouped(txs, |t| t.merchant.as_str())
        .into_iter()
        .map(|(merchant, txs)| MerchantAmount {
            merchant: merchant.to_string(),
            amount: txs.iter().map(|t| t.amount).sum(),
        })
        .collect();
    merchants.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    merchants.truncate(3);
    for m in &mut merchants {
        m.amount = round2(m.amount);
    }

    Some(BiggestDay {
        date,
        total: round2(total),
        top_merchants: merchants,
    })
}

/// Mean per-day total plus the 3 weekdays with the highest mean amount
pub fn average_daily_spending(transactions: &[Transaction]) -> DailySpending {
    if transactions.is_empty() {
        return DailySpending::default();
    }

    let days = grouped(transactions, |t| t.date);
    let daily_total: f64 = transactions.iter().map(|t| t.amount).sum();
    let daily_average = round2(daily_total / days.len() as f64);

    let mut weekdays: Vec<WeekdayAverage> =
        grouped(transactions, |t| t.date.weekday().num_days_from_monday())
            .into_iter()
            .map(|(weekday, txs)| WeekdayAverage {
                weekday,
                name: weekday_name(weekday).to_string(),
                average: txs.iter().map(|t| t.amount).sum::<f64>() / txs.len() as f64,
            })
            .collect();
    weekdays.sort_by(|a, b| b.average.total_cmp(&a.average));
    weekdays.truncate(3);
    for w in &mut weekdays {
        w.average = round2(w.average);
    }

    DailySpending {
        daily_average,
        top_weekdays: weekdays,
    }
}

/// Merchants ranked by total spent, with their mean monthly spend
pub fn top_merchants_by_spend(transactions: &[Transaction], n: usize) -> Vec<MerchantSpend> {
    let mut ranked: Vec<MerchantSpend> = grouped(transactions, |t| t.merchant.as_str())
        .into_iter()
        .map(|(merchant, txs)| {
            let total: f64 = txs.iter().map(|t| t.amount).sum();
            let months: HashSet<(i32, u32)> = txs.iter().map(|t| month_key(t.date)).collect();
            MerchantSpend {
                merchant: merchant.to_string(),
                total_spent: round2(total),
                monthly_average: round2(total / months.len() as f64),
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));
    ranked.truncate(n);
    ranked
}

fn category_counts(transactions: &[Transaction]) -> Vec<CategoryCount> {
    grouped(transactions, |t| t.merchant_category.as_str())
        .into_iter()
        .map(|(category, txs)| CategoryCount {
            category: category.to_string(),
            count: txs.len(),
            total: round2(txs.iter().map(|t| t.amount).sum()),
        })
        .collect()
}

/// Group by key in first-appearance order
fn grouped<'t, K, F>(
    transactions: impl IntoIterator<Item = &'t Transaction>,
    key: F,
) -> Vec<(K, Vec<&'t Transaction>)>
where
    K: Eq + Hash + Copy,
    F: Fn(&'t Transaction) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&'t Transaction>)> = Vec::new();
    for tx in transactions {
        let k = key(tx);
        let i = *index.entry(k).or_insert_with(|| {
            groups.push((k, Vec::new()));
            groups.len() - 1
        });
        groups[i].1.push(tx);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tx;

    fn with_category(mut t: Transaction, category: &str) -> Transaction {
        t.merchant_category = category.to_string();
        t
    }

    fn sample() -> Vec<Transaction> {
        vec![
            with_category(tx("c1", "2022-01-03", "OXXO", 20.0), "convenience"),
            with_category(tx("c1", "2022-01-03", "NETFLIX", 139.0), "streaming"),
            with_category(tx("c1", "2022-01-10", "OXXO", 35.5), "convenience"),
            with_category(tx("c1", "2022-02-14", "AMAZON", 400.0), "retail"),
            with_category(tx("c1", "2022-02-14", "OXXO", 10.0), "groceries"),
            with_category(tx("c1", "2022-02-03", "NETFLIX", 139.0), "streaming"),
        ]
    }

    #[test]
    fn test_annual_summary() {
        let summary = annual_summary(&sample()).unwrap();
        assert_eq!(summary.total_spent, 743.5);
        assert_eq!(summary.transaction_days, 4);
        assert_eq!(summary.transaction_count, 6);
        assert_eq!(summary.unique_merchants, 3);
        assert!(annual_summary(&[]).is_none());
    }

    #[test]
    fn test_top_merchants_by_visits_keeps_last_category() {
        let top = top_merchants_by_visits(&sample(), 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].merchant, "OXXO");
        assert_eq!(top[0].count, 3);
        assert_eq!(top[0].total, 65.5);
        assert_eq!(top[0].category, "groceries");
        assert_eq!(top[1].merchant, "NETFLIX");
    }

    #[test]
    fn test_favorite_category_share() {
        let favorite = favorite_category(&sample(), 743.5).unwrap();
        // convenience and streaming tie at 2; convenience appears first
        assert_eq!(favorite.category, "convenience");
        assert_eq!(favorite.purchase_count, 2);
        assert_eq!(favorite.average_spent, 27.75);
        assert_eq!(favorite.share_percent, 7.46);

        let no_total = favorite_category(&sample(), 0.0).unwrap();
        assert_eq!(no_total.share_percent, 0.0);
        assert!(favorite_category(&[], 10.0).is_none());
    }

    #[test]
    fn test_top_categories() {
        let top = top_categories(&sample(), 5);
        assert_eq!(top.len(), 4);
        assert_eq!(top[0].category, "convenience");
        assert_eq!(top[1].category, "streaming");
        assert_eq!(top[1].total, 278.0);
    }

    #[test]
    fn test_day_most_spent() {
        let day = day_most_spent(&sample()).unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2022, 2, 14).unwrap());
        assert_eq!(day.total, 410.0);
        assert_eq!(day.top_merchants[0].merchant, "AMAZON");
        assert_eq!(day.top_merchants.len(), 2);
        assert!(day_most_spent(&[]).is_none());
    }

    #[test]
    fn test_average_daily_spending() {
        let daily = average_daily_spending(&sample());
        // 743.5 over 4 distinct days
        assert_eq!(daily.daily_average, 185.88);
        // One Thursday row at 139; five Monday rows averaging 120.9
        assert_eq!(daily.top_weekdays[0].weekday, 3);
        assert_eq!(daily.top_weekdays[0].name, "Thursday");
        assert_eq!(daily.top_weekdays[0].average, 139.0);
        assert_eq!(daily.top_weekdays[1].name, "Monday");
        assert_eq!(daily.top_weekdays[1].average, 120.9);

        assert_eq!(average_daily_spending(&[]), DailySpending::default());
    }

    #[test]
    fn test_top_merchants_by_spend_monthly_average() {
        let top = top_merchants_by_spend(&sample(), 5);
        assert_eq!(top[0].merchant, "AMAZON");
        assert_eq!(top[1].merchant, "NETFLIX");
        assert_eq!(top[1].total_spent, 278.0);
        assert_eq!(top[1].monthly_average, 139.0);
    }

    #[test]
    fn test_year_in_review_filters_year() {
        let mut transactions = sample();
        transactions.push(tx("c1", "2021-12-31", "OLD", 5000.0));

        let review = year_in_review(&transactions, 2022, &WrappedConfig::default());
        assert_eq!(review.summary.unwrap().total_spent, 743.5);
        assert!(review.top_spend.iter().all(|m| m.merchant != "OLD"));

        let empty = year_in_review(&transactions, 2030, &WrappedConfig::default());
        assert!(empty.summary.is_none());
        assert!(empty.top_merchants.is_empty());
    }
}
