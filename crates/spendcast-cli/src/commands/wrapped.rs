//! Year-in-review command

use std::path::Path;

use anyhow::Result;
use spendcast_core::wrapped::year_in_review;
use spendcast_core::AnalyticsConfig;

use super::{filter_client, load_transactions, truncate, Output};

pub fn cmd_wrapped(
    config: &AnalyticsConfig,
    output: Output,
    file: &Path,
    year: Option<i32>,
    client: Option<&str>,
) -> Result<()> {
    let year = year.unwrap_or(config.aggregation.reference_year);
    let transactions = filter_client(load_transactions(config, file)?, client);
    let review = year_in_review(&transactions, year, &config.wrapped);

    if output.json {
        return output.print_json(&review);
    }

    let Some(summary) = &review.summary else {
        println!("No transactions in {}.", year);
        return Ok(());
    };

    println!();
    println!("🎁 Your {} Wrapped", year);
    println!("   ─────────────────────────────────────────────");
    println!("   Total spent:        ${:.2}", summary.total_spent);
    println!("   Transactions:       {}", summary.transaction_count);
    println!("   Days with spending: {}", summary.transaction_days);
    println!("   Merchants visited:  {}", summary.unique_merchants);
    println!(
        "   Daily average:      ${:.2}",
        review.daily_spending.daily_average
    );

    if let Some(favorite) = &review.favorite_category {
        println!();
        println!(
            "   ⭐ Favorite category: {} ({} purchases, {:.2}% of spend)",
            favorite.category, favorite.purchase_count, favorite.share_percent
        );
    }

    if let Some(day) = &review.biggest_day {
        println!("   💸 Biggest day: {} (${:.2})", day.date, day.total);
    }

    println!();
    println!("   Most visited");
    for merchant in &review.top_merchants {
        println!(
            "   {:24} {:>4} visits  ${:>10.2}",
            truncate(&merchant.merchant, 24),
            merchant.count,
            merchant.total
        );
    }

    println!();
    println!("   Biggest spend");
    for merchant in &review.top_spend {
        println!(
            "   {:24} ${:>10.2}  (${:.2}/mo)",
            truncate(&merchant.merchant, 24),
            merchant.total_spent,
            merchant.monthly_average
        );
    }

    if !review.daily_spending.top_weekdays.is_empty() {
        println!();
        println!("   Top weekdays by average purchase");
        for weekday in &review.daily_spending.top_weekdays {
            println!("   {:12} ${:>10.2}", weekday.name, weekday.average);
        }
    }

    Ok(())
}
