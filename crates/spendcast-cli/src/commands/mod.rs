//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (config, transaction and snapshot loading, output)
//! - `recurring` - Recurring payment detection
//! - `trend` - Month-over-month trend
//! - `forecast` - Forecast, batch prediction, increment and bucket commands
//! - `wrapped` - Year-in-review summary
//! - `dataset` - Training dataset export

pub mod core;
pub mod dataset;
pub mod forecast;
pub mod recurring;
pub mod trend;
pub mod wrapped;

// Re-export command functions for main.rs
pub use core::*;
pub use dataset::*;
pub use forecast::*;
pub use recurring::*;
pub use trend::*;
pub use wrapped::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
