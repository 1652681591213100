//! Forecasting command implementations
//!
//! - `cmd_forecast` - Annualized top merchants and predicted monthly totals
//! - `cmd_predict` - Single-batch ranked predictions
//! - `cmd_increment` - Increment-bucket probabilities
//! - `cmd_bucket` - Classify one delta

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use spendcast_core::config::ForecastConfig;
use spendcast_core::models::MonthlyAmount;
use spendcast_core::{
    classify_increment_bucket, AggregationMode, AnalyticsConfig, ForecastingPipeline,
    MerchantForecast,
};

use super::{filter_client, load_snapshot, load_transactions, truncate, Output};

/// Forecast output: per-client merchants (grouped, in first-appearance order)
/// plus month totals across all clients
#[derive(Debug, Serialize)]
pub struct ForecastReport {
    pub snapshot: String,
    pub mode: AggregationMode,
    pub top_merchants: Vec<MerchantForecast>,
    pub monthly_totals: Vec<MonthlyAmount>,
    pub total: f64,
}

pub fn cmd_forecast(
    config: &AnalyticsConfig,
    output: Output,
    file: &Path,
    snapshot_path: &Path,
    client: Option<&str>,
    top: Option<usize>,
    mode: Option<AggregationMode>,
) -> Result<()> {
    let transactions = filter_client(load_transactions(config, file)?, client);
    let snapshot = load_snapshot(snapshot_path)?;

    let forecast_config = ForecastConfig {
        annual_top_k: top.unwrap_or(config.forecast.annual_top_k),
        annual_mode: mode.unwrap_or(config.forecast.annual_mode),
        ..config.forecast.clone()
    };
    let mode = forecast_config.annual_mode;
    let pipeline = ForecastingPipeline::with_config(&snapshot, forecast_config);
    let annual = pipeline
        .annual_forecast(&transactions)
        .context("Forecast failed")?;

    let report = ForecastReport {
        snapshot: snapshot.fingerprint().to_string(),
        mode,
        top_merchants: annual.top_merchants,
        monthly_totals: annual.monthly_totals,
        total: annual.total,
    };

    if output.json {
        return output.print_json(&report);
    }

    if report.top_merchants.is_empty() {
        println!("No transactions to forecast.");
        return Ok(());
    }

    println!();
    println!(
        "🔮 Next-Year Forecast (snapshot {}, {} of predictions)",
        report.snapshot, report.mode
    );
    let mut current_client: Option<&str> = None;
    for merchant in &report.top_merchants {
        if current_client != Some(merchant.client_id.as_str()) {
            current_client = Some(merchant.client_id.as_str());
            println!();
            println!("   {}", merchant.client_id);
            println!("   ─────────────────────────────────────────────");
        }
        println!(
            "   {:28} ${:>12.2}",
            truncate(&merchant.merchant, 28),
            merchant.amount
        );
    }

    println!();
    println!("   Predicted spend by month");
    for month in &report.monthly_totals {
        println!("   {:12} ${:>12.2}", month.label, month.amount);
    }
    println!("   ─────────────────────────────────────────────");
    println!("   {:12} ${:>12.2}", "Total", report.total);

    Ok(())
}

pub fn cmd_predict(
    config: &AnalyticsConfig,
    output: Output,
    file: &Path,
    snapshot_path: &Path,
) -> Result<()> {
    let transactions = load_transactions(config, file)?;
    let snapshot = load_snapshot(snapshot_path)?;
    let pipeline = ForecastingPipeline::with_config(&snapshot, config.forecast.clone());
    let records = pipeline
        .predict_batch(&transactions)
        .context("Prediction failed")?;

    if output.json {
        return output.print_json(&records);
    }

    if records.is_empty() {
        println!("No transactions to predict.");
        return Ok(());
    }

    println!();
    println!("🎯 Predicted Purchases (snapshot {})", snapshot.fingerprint());
    println!("   ─────────────────────────────────────────────────────────────");
    for record in &records {
        println!(
            "   {:12} #{} {:24} │ {:>5.1}% │ ${:>10.2}",
            truncate(&record.client_id, 12),
            record.rank,
            truncate(&record.merchant, 24),
            record.purchase_probability * 100.0,
            record.predicted_amount
        );
    }

    Ok(())
}

pub fn cmd_increment(
    config: &AnalyticsConfig,
    output: Output,
    file: &Path,
    snapshot_path: &Path,
    year: Option<i32>,
) -> Result<()> {
    let year = year.unwrap_or(config.aggregation.reference_year);
    let transactions = load_transactions(config, file)?;
    let snapshot = load_snapshot(snapshot_path)?;
    let pipeline = ForecastingPipeline::with_config(&snapshot, config.forecast.clone())
        .with_feature_months(config.aggregation.feature_months);
    let predictions = pipeline
        .predict_increment(&transactions, year)
        .context("Increment prediction failed")?;

    if output.json {
        return output.print_json(&predictions);
    }

    if predictions.is_empty() {
        println!("No transactions in {}.", year);
        return Ok(());
    }

    println!();
    println!("📊 Spending Increment Outlook ({})", year);
    println!("   ─────────────────────────────────────────────────────────────");
    for prediction in &predictions {
        let probabilities: Vec<String> = prediction
            .probabilities
            .iter()
            .map(|(label, pct)| format!("{} {:.2}%", label, pct))
            .collect();
        println!(
            "   {:12} {:24} │ {}",
            truncate(&prediction.client_id, 12),
            truncate(&prediction.merchant, 24),
            probabilities.join("  ")
        );
    }

    Ok(())
}

pub fn cmd_bucket(output: Output, delta: f64) -> Result<()> {
    let bucket = classify_increment_bucket(delta);

    if output.json {
        return output.print_json(&serde_json::json!({ "delta": delta, "bucket": bucket }));
    }

    println!("{}", bucket);
    Ok(())
}
