//! Analytics configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit override path, or the override in the data dir
//!    (~/.local/share/spendcast/config/analytics.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Every key has a default, so override files only need the keys they change.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::AggregationMode;
use crate::temporal::DateFormat;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/analytics.toml");

/// Recurring-payment detection settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecurrenceConfig {
    /// Minimum distinct buckets and same-day occurrences for a pattern
    pub min_observations: usize,
    /// Weeks per month used to turn weekly totals into a monthly average
    pub weeks_per_month: f64,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            min_observations: 3,
            weeks_per_month: 4.345,
        }
    }
}

/// Forecasting pipeline settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub batch_top_k: usize,
    pub batch_mode: AggregationMode,
    pub annual_top_k: usize,
    pub annual_mode: AggregationMode,
    /// Multiplier turning a mean monthly amount into a yearly one
    pub annualize_factor: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            batch_top_k: 3,
            batch_mode: AggregationMode::Sum,
            annual_top_k: 5,
            annual_mode: AggregationMode::Mean,
            annualize_factor: 12.0,
        }
    }
}

/// Aggregation and feature-window settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub reference_year: i32,
    pub clip_quantile: f64,
    pub feature_months: u32,
    pub label_month: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            reference_year: 2022,
            clip_quantile: 0.95,
            feature_months: 7,
            label_month: 8,
        }
    }
}

/// Import boundary settings
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ImportConfig {
    pub date_format: DateFormat,
}

/// Year-in-review settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WrappedConfig {
    pub top_n: usize,
}

impl Default for WrappedConfig {
    fn default() -> Self {
        Self { top_n: 5 }
    }
}

/// Top-level analytics configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub recurrence: RecurrenceConfig,
    pub forecast: ForecastConfig,
    pub aggregation: AggregationConfig,
    pub import: ImportConfig,
    pub wrapped: WrappedConfig,
}

impl AnalyticsConfig {
    /// Load with the default resolution (data dir override, then embedded)
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit override path, falling back to embedded defaults
    /// when the path does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: AnalyticsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.aggregation.clip_quantile) {
            return Err(Error::Config(format!(
                "clip_quantile must be within [0, 1], got {}",
                self.aggregation.clip_quantile
            )));
        }
        if self.aggregation.feature_months == 0 || self.aggregation.feature_months > 12 {
            return Err(Error::Config(format!(
                "feature_months must be within 1..=12, got {}",
                self.aggregation.feature_months
            )));
        }
        if !(1..=12).contains(&self.aggregation.label_month) {
            return Err(Error::Config(format!(
                "label_month must be within 1..=12, got {}",
                self.aggregation.label_month
            )));
        }
        if self.aggregation.label_month <= self.aggregation.feature_months {
            return Err(Error::Config(format!(
                "label_month ({}) must come after the feature window (months 1..={})",
                self.aggregation.label_month, self.aggregation.feature_months
            )));
        }
        if self.recurrence.weeks_per_month <= 0.0 {
            return Err(Error::Config("weeks_per_month must be positive".into()));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendcast").join("config").join("analytics.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<AnalyticsConfig> {
    let path = match override_path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let content = match path {
        Some(path) if path.exists() => {
            debug!("Loading analytics config from {}", path.display());
            fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    AnalyticsConfig::parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_default_config() {
        let config = AnalyticsConfig::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, AnalyticsConfig::default());
        assert_eq!(config.recurrence.min_observations, 3);
        assert_eq!(config.forecast.batch_top_k, 3);
        assert_eq!(config.forecast.annual_top_k, 5);
        assert_eq!(config.aggregation.label_month, 8);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = AnalyticsConfig::parse(
            r#"
[forecast]
annual_top_k = 10
annual_mode = "sum"
"#,
        )
        .unwrap();

        assert_eq!(config.forecast.annual_top_k, 10);
        assert_eq!(config.forecast.annual_mode, AggregationMode::Sum);
        assert_eq!(config.forecast.batch_top_k, 3);
        assert_eq!(config.recurrence, RecurrenceConfig::default());
    }

    #[test]
    fn test_invalid_quantile_rejected() {
        let result = AnalyticsConfig::parse("[aggregation]\nclip_quantile = 1.5\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_label_month_inside_feature_window_rejected() {
        let result = AnalyticsConfig::parse("[aggregation]\nfeature_months = 8\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let result = AnalyticsConfig::parse("[aggregation]\nlabel_month = 3\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let config =
            AnalyticsConfig::parse("[aggregation]\nfeature_months = 6\nlabel_month = 9\n").unwrap();
        assert_eq!(config.aggregation.feature_months, 6);
        assert_eq!(config.aggregation.label_month, 9);
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = AnalyticsConfig::parse("[forecast\nbatch_top_k = 3");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[import]\ndate_format = \"dmy\"").unwrap();

        let config = AnalyticsConfig::load_from(file.path()).unwrap();
        assert_eq!(config.import.date_format, DateFormat::DayMonthYear);
    }

    #[test]
    fn test_load_from_missing_path_uses_embedded() {
        let config = AnalyticsConfig::load_from(Path::new("/nonexistent/analytics.toml")).unwrap();
        assert_eq!(config, AnalyticsConfig::default());
    }
}
