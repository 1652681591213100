//! Training dataset export

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use spendcast_core::training::{prepare_increment_dataset, prepare_purchase_dataset, write_jsonl};
use spendcast_core::{AnalyticsConfig, TrainingCorpus, Transaction};

use super::load_transactions;

/// Write maps.json, train.jsonl, holdout_N.jsonl and increment.jsonl into `out`
pub fn cmd_dataset(
    config: &AnalyticsConfig,
    train: &Path,
    holdouts: &[std::path::PathBuf],
    out: &Path,
) -> Result<()> {
    let train_set = load_transactions(config, train)?;
    let holdout_sets: Vec<Vec<Transaction>> = holdouts
        .iter()
        .map(|path| load_transactions(config, path))
        .collect::<Result<_>>()?;
    let holdout_refs: Vec<&[Transaction]> = holdout_sets.iter().map(Vec::as_slice).collect();

    let maps = TrainingCorpus::build_maps(&train_set);
    let dataset = prepare_purchase_dataset(&train_set, &holdout_refs, &maps, &config.aggregation)
        .context("Failed to prepare purchase dataset")?;
    let increments = prepare_increment_dataset(&train_set, &maps, &config.aggregation);

    fs::create_dir_all(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;

    fs::write(out.join("maps.json"), serde_json::to_string_pretty(&maps)?)?;

    let mut writer = BufWriter::new(File::create(out.join("train.jsonl"))?);
    let train_rows = dataset.write_jsonl(&mut writer)?;
    writer.flush()?;

    for index in 0..holdout_sets.len() {
        let mut writer =
            BufWriter::new(File::create(out.join(format!("holdout_{}.jsonl", index + 1)))?);
        write_jsonl(&mut writer, &dataset.holdout_rows(index))?;
        writer.flush()?;
    }

    let mut writer = BufWriter::new(File::create(out.join("increment.jsonl"))?);
    let increment_rows = write_jsonl(&mut writer, &increments)?;
    writer.flush()?;

    println!("✅ Dataset written to {}", out.display());
    println!("   Training rows:  {}", train_rows);
    println!("   Holdout sets:   {}", holdout_sets.len());
    println!("   Increment rows: {}", increment_rows);
    println!("   Clip threshold: ${:.2}", dataset.clip.threshold);

    Ok(())
}
