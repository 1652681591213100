//! Recurring payment command

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use spendcast_core::recurrence::{top_recurring, RecurrencePatternDetector};
use spendcast_core::temporal::weekday_name;
use spendcast_core::{AnalyticsConfig, Periodicity, RecurrencePattern};

use super::{filter_client, load_transactions, truncate, Output};

pub fn cmd_recurring(
    config: &AnalyticsConfig,
    output: Output,
    file: &Path,
    client: Option<&str>,
    top: Option<usize>,
) -> Result<()> {
    let transactions = filter_client(load_transactions(config, file)?, client);
    let detector = RecurrencePatternDetector::with_config(config.recurrence.clone());

    let by_client: BTreeMap<String, Vec<(String, RecurrencePattern)>> = detector
        .detect_by_client(&transactions)
        .into_iter()
        .map(|(client, patterns)| {
            let limit = top.unwrap_or(patterns.len());
            (client, top_recurring(&patterns, limit))
        })
        .collect();

    if output.json {
        return output.print_json(&by_client);
    }

    if by_client.values().all(|patterns| patterns.is_empty()) {
        println!("No recurring payments detected.");
        return Ok(());
    }

    for (client, patterns) in &by_client {
        if patterns.is_empty() {
            continue;
        }

        println!();
        println!("🔁 Recurring payments for {}", client);
        println!("   ─────────────────────────────────────────────────────────────");

        for (merchant, pattern) in patterns {
            println!(
                "   {:24} │ {:<7} │ {:<12} │ {:>10} │ {:>10}/mo",
                truncate(merchant, 24),
                pattern.periodicity.as_str(),
                payment_day_label(pattern),
                format!("${:.2}", pattern.mean_amount),
                format!("${:.2}", pattern.monthly_average),
            );
        }
    }

    Ok(())
}

/// "day 5" for monthly patterns, the weekday name for weekly ones
pub fn payment_day_label(pattern: &RecurrencePattern) -> String {
    match pattern.periodicity {
        Periodicity::Monthly => format!("day {}", pattern.payment_day),
        Periodicity::Weekly => weekday_name(pattern.payment_day).to_string(),
    }
}
