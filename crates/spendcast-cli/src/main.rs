//! Spendcast CLI - Transaction analytics and forecasting
//!
//! Usage:
//!   spendcast recurring --file tx.csv             Detect recurring payments
//!   spendcast trend --file tx.csv                 Month-over-month trend
//!   spendcast forecast --file tx.csv --snapshot S Annualized merchant forecast
//!   spendcast bucket 25                           Classify an increment delta

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;
    let output = commands::Output { json: cli.json };

    match cli.command {
        Commands::Recurring { file, client, top } => {
            commands::cmd_recurring(&config, output, &file, client.as_deref(), top)
        }
        Commands::Trend { file, year } => commands::cmd_trend(&config, output, &file, year),
        Commands::Forecast {
            file,
            snapshot,
            client,
            top,
            mode,
        } => commands::cmd_forecast(
            &config,
            output,
            &file,
            &snapshot,
            client.as_deref(),
            top,
            mode,
        ),
        Commands::Predict { file, snapshot } => {
            commands::cmd_predict(&config, output, &file, &snapshot)
        }
        Commands::Increment {
            file,
            snapshot,
            year,
        } => commands::cmd_increment(&config, output, &file, &snapshot, year),
        Commands::Wrapped { file, year, client } => {
            commands::cmd_wrapped(&config, output, &file, year, client.as_deref())
        }
        Commands::Bucket { delta } => commands::cmd_bucket(output, delta),
        Commands::Dataset {
            train,
            holdout,
            out,
        } => commands::cmd_dataset(&config, &train, &holdout, &out),
    }
}
