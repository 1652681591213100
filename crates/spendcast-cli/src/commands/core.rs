//! Shared command utilities
//!
//! This module contains:
//! - `load_config` - Resolve the analytics config for this run
//! - `load_transactions` - Import and normalize a transaction file
//! - `load_snapshot` - Load a model snapshot
//! - `Output` - Table vs JSON output selection

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use spendcast_core::{import, AnalyticsConfig, ModelSnapshot, Transaction};
use tracing::warn;

/// Where command results go
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as pretty JSON
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Load the config from `--config`, the data dir override, or the built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<AnalyticsConfig> {
    match path {
        Some(path) => AnalyticsConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => AnalyticsConfig::load().context("Failed to load analytics config"),
    }
}

/// Read a CSV or JSON transaction file with the configured date format
pub fn load_transactions(config: &AnalyticsConfig, path: &Path) -> Result<Vec<Transaction>> {
    let outcome = import::load_file(path, config.import.date_format)
        .with_context(|| format!("Failed to read transactions from {}", path.display()))?;

    if outcome.skipped > 0 {
        warn!(
            "{} record(s) in {} skipped (malformed date or amount)",
            outcome.skipped,
            path.display()
        );
    }

    Ok(outcome.transactions)
}

pub fn load_snapshot(path: &Path) -> Result<ModelSnapshot> {
    ModelSnapshot::load(path)
        .with_context(|| format!("Failed to load model snapshot {}", path.display()))
}

/// Keep only `client`'s transactions when a client filter is given
pub fn filter_client(transactions: Vec<Transaction>, client: Option<&str>) -> Vec<Transaction> {
    match client {
        Some(client) => transactions
            .into_iter()
            .filter(|t| t.client_id == client)
            .collect(),
        None => transactions,
    }
}
