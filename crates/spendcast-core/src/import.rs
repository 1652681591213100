//! Boundary normalization
//!
//! Every external representation (CSV exports, JSON record dumps) is turned
//! into canonical [`Transaction`] values here, before anything reaches the
//! analytics code. Column names are matched in either the original Spanish
//! export headers (`fecha`, `comercio`, `giro_comercio`, `tipo_venta`,
//! `monto`) or their English equivalents.
//!
//! A malformed date or amount only drops that record: it is logged, counted
//! in [`ImportOutcome::skipped`], and the rest of the batch continues.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::temporal::DateFormat;

const CLIENT_COLUMNS: &[&str] = &["id", "client_id", "cliente"];
const DATE_COLUMNS: &[&str] = &["fecha", "date"];
const MERCHANT_COLUMNS: &[&str] = &["comercio", "merchant"];
const CATEGORY_COLUMNS: &[&str] = &["giro_comercio", "merchant_category", "category"];
const SALE_TYPE_COLUMNS: &[&str] = &["tipo_venta", "sale_type"];
const AMOUNT_COLUMNS: &[&str] = &["monto", "amount"];

/// A record as it arrives, every field still text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTransaction {
    pub client_id: String,
    pub date: String,
    pub merchant: String,
    pub merchant_category: String,
    pub sale_type: String,
    pub amount: String,
}

impl RawTransaction {
    /// Convert to the canonical form using the caller's date format
    pub fn normalize(&self, format: DateFormat) -> Result<Transaction> {
        Ok(Transaction {
            client_id: self.client_id.trim().to_string(),
            date: format.parse(&self.date)?,
            merchant: self.merchant.trim().to_string(),
            merchant_category: self.merchant_category.trim().to_string(),
            sale_type: self.sale_type.trim().to_string(),
            amount: parse_amount(&self.amount)?,
        })
    }
}

/// Result of normalizing a batch
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub transactions: Vec<Transaction>,
    /// Records dropped because of a malformed date or amount, or undecodable text
    pub skipped: usize,
}

/// Input file encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Pick the format from a file extension (`.json`, anything else is CSV)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Parse an amount; blank means 0.0
pub fn parse_amount(value: &str) -> Result<f64> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return Ok(0.0);
    }
    let amount: f64 = cleaned
        .parse()
        .map_err(|_| Error::Parse(format!("invalid amount '{}'", value)))?;
    if !amount.is_finite() {
        return Err(Error::Parse(format!("invalid amount '{}'", value)));
    }
    Ok(amount)
}

/// Normalize a batch of raw records, skipping the ones that fail to parse
pub fn normalize_all<I>(records: I, format: DateFormat) -> ImportOutcome
where
    I: IntoIterator<Item = RawTransaction>,
{
    let mut outcome = ImportOutcome::default();
    for (index, raw) in records.into_iter().enumerate() {
        match raw.normalize(format) {
            Ok(tx) => outcome.transactions.push(tx),
            Err(e) => {
                warn!("Skipping record {}: {}", index + 1, e);
                outcome.skipped += 1;
            }
        }
    }
    outcome
}

/// Read transactions from a CSV export
pub fn parse_csv<R: Read>(reader: R, format: DateFormat) -> Result<ImportOutcome> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = ColumnIndex::resolve(&headers)?;

    let mut raw = Vec::new();
    let mut undecodable = 0;
    for (index, result) in rdr.records().enumerate() {
        match result {
            Ok(record) => raw.push(columns.extract(&record)),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping CSV record {}: {}", index + 1, e);
                undecodable += 1;
            }
        }
    }

    let mut outcome = normalize_all(raw, format);
    outcome.skipped += undecodable;
    debug!(
        "Parsed {} CSV transactions ({} skipped)",
        outcome.transactions.len(),
        outcome.skipped
    );
    Ok(outcome)
}

/// Read transactions from a JSON array of flat records
pub fn parse_json<R: Read>(reader: R, format: DateFormat) -> Result<ImportOutcome> {
    let records: Vec<serde_json::Map<String, Value>> = serde_json::from_reader(reader)?;

    let raw = records.iter().map(|record| RawTransaction {
        client_id: json_field(record, CLIENT_COLUMNS),
        date: json_field(record, DATE_COLUMNS),
        merchant: json_field(record, MERCHANT_COLUMNS),
        merchant_category: json_field(record, CATEGORY_COLUMNS),
        sale_type: json_field(record, SALE_TYPE_COLUMNS),
        amount: json_field(record, AMOUNT_COLUMNS),
    });

    let outcome = normalize_all(raw, format);
    debug!(
        "Parsed {} JSON transactions ({} skipped)",
        outcome.transactions.len(),
        outcome.skipped
    );
    Ok(outcome)
}

/// Read a transaction file, choosing CSV or JSON from its extension
pub fn load_file(path: &Path, format: DateFormat) -> Result<ImportOutcome> {
    let file = File::open(path)?;
    match InputFormat::from_path(path) {
        InputFormat::Json => parse_json(file, format),
        InputFormat::Csv => parse_csv(file, format),
    }
}

/// Positions of the canonical columns in a CSV header
struct ColumnIndex {
    client: Option<usize>,
    date: usize,
    merchant: usize,
    category: Option<usize>,
    sale_type: Option<usize>,
    amount: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };

        Ok(Self {
            client: find(CLIENT_COLUMNS),
            date: find(DATE_COLUMNS)
                .ok_or_else(|| Error::InvalidData("missing date column".into()))?,
            merchant: find(MERCHANT_COLUMNS)
                .ok_or_else(|| Error::InvalidData("missing merchant column".into()))?,
            category: find(CATEGORY_COLUMNS),
            sale_type: find(SALE_TYPE_COLUMNS),
            amount: find(AMOUNT_COLUMNS),
        })
    }

    fn extract(&self, record: &StringRecord) -> RawTransaction {
        let get = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string()
        };

        RawTransaction {
            client_id: get(self.client),
            date: get(Some(self.date)),
            merchant: get(Some(self.merchant)),
            merchant_category: get(self.category),
            sale_type: get(self.sale_type),
            amount: get(self.amount),
        }
    }
}

/// First present field among `names`, rendered as text
fn json_field(record: &serde_json::Map<String, Value>, names: &[&str]) -> String {
    let value = record.iter().find_map(|(key, value)| {
        names
            .iter()
            .any(|n| key.trim().eq_ignore_ascii_case(n))
            .then_some(value)
    });

    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
