//! Trend command

use std::path::Path;

use anyhow::Result;
use spendcast_core::models::quarter_label;
use spendcast_core::{AnalyticsConfig, TrendAnalyzer};

use super::{load_transactions, Output};

pub fn cmd_trend(
    config: &AnalyticsConfig,
    output: Output,
    file: &Path,
    year: Option<i32>,
) -> Result<()> {
    let year = year.unwrap_or(config.aggregation.reference_year);
    let transactions = load_transactions(config, file)?;
    let summary = TrendAnalyzer::for_year(year).compute_monthly_trend(&transactions);

    if output.json {
        return output.print_json(&summary);
    }

    if summary.monthly_spend.is_empty() {
        println!("No transactions in {}.", year);
        return Ok(());
    }

    println!();
    println!("📈 Monthly Spending Trend ({})", year);
    println!("   ─────────────────────────────────────────────");

    for month in &summary.monthly_spend {
        println!("   {:12} ${:>12.2}", month.label, month.amount);
    }

    if !summary.changes.is_empty() {
        println!();
        for change in &summary.changes {
            let pct = change
                .change_percent
                .map(|p| format!("{:+.2}%", p))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "   {:>10} → {:<10} {:>10}",
                change.from_label, change.to_label, pct
            );
        }
    }

    println!();
    println!(
        "   Average change:        {:+.2}%",
        summary.average_change_percent
    );
    println!(
        "   Average monthly spend: ${:.2}",
        summary.average_monthly_amount
    );
    if let Some(largest) = &summary.largest_increase {
        println!(
            "   Largest increase:      {} → {} ({:+.2}%)",
            largest.from_label, largest.to_label, largest.change_percent
        );
    }
    if let Some(quarter) = summary.most_active_quarter {
        println!("   Most active quarter:   {}", quarter_label(quarter));
    }
    if summary.undefined_changes > 0 {
        println!(
            "   ⚠️  {} change(s) undefined (previous month total was zero)",
            summary.undefined_changes
        );
    }

    Ok(())
}
