//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use spendcast_core::AggregationMode;

/// Spendcast - Understand and forecast card spending
#[derive(Parser)]
#[command(name = "spendcast")]
#[command(about = "Transaction analytics and merchant spend forecasting", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Analytics config file (defaults to the data dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect recurring monthly/weekly payments
    Recurring {
        /// Transaction file (CSV or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Only analyze this client
        #[arg(short, long)]
        client: Option<String>,

        /// Only show the N recurring payments with the highest mean amount
        #[arg(short, long)]
        top: Option<usize>,
    },

    /// Month-over-month spending trend
    Trend {
        /// Transaction file (CSV or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Year to analyze (defaults to the configured reference year)
        #[arg(short, long)]
        year: Option<i32>,
    },

    /// Annualized forecast: top merchants and predicted monthly totals
    Forecast {
        /// Transaction file (CSV or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Model snapshot (JSON)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Only forecast this client
        #[arg(short, long)]
        client: Option<String>,

        /// Merchants to keep per client (defaults to the configured annual top-k)
        #[arg(short, long)]
        top: Option<usize>,

        /// Aggregation of per-row predictions: mean or sum
        #[arg(short, long)]
        mode: Option<AggregationMode>,
    },

    /// Single-batch prediction: ranked merchants per client
    Predict {
        /// Transaction file (CSV or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Model snapshot (JSON)
        #[arg(short, long)]
        snapshot: PathBuf,
    },

    /// Increment-bucket probabilities per client and merchant
    Increment {
        /// Transaction file (CSV or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Model snapshot (JSON) with an increment classifier
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Year to pivot (defaults to the configured reference year)
        #[arg(short, long)]
        year: Option<i32>,
    },

    /// Year-in-review summary for one client
    Wrapped {
        /// Transaction file (CSV or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Year to summarize (defaults to the configured reference year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Only summarize this client
        #[arg(short, long)]
        client: Option<String>,
    },

    /// Classify a month-over-month delta into an increment bucket
    Bucket {
        /// Delta to classify (e.g. 25 or -12.5)
        #[arg(allow_hyphen_values = true)]
        delta: f64,
    },

    /// Export training datasets as JSONL for the model trainer
    Dataset {
        /// Training transactions (CSV or JSON)
        #[arg(long)]
        train: PathBuf,

        /// Holdout sets (validation, test), clipped with the training threshold
        #[arg(long)]
        holdout: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "dataset")]
        out: PathBuf,
    },
}
