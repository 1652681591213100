//! Temporal feature extraction
//!
//! The date format is always chosen by the call site. Nothing here guesses
//! a format from the input.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Date formats accepted at the import boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateFormat {
    /// `YYYY-MM-DD`
    #[default]
    #[serde(rename = "iso")]
    Iso,
    /// `DD/MM/YY`
    #[serde(rename = "dmy")]
    DayMonthYear,
}

impl DateFormat {
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Iso => "%Y-%m-%d",
            Self::DayMonthYear => "%d/%m/%y",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iso => "iso",
            Self::DayMonthYear => "dmy",
        }
    }

    /// Parse a date string in this format
    pub fn parse(&self, value: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), self.pattern()).map_err(|e| {
            Error::Parse(format!(
                "date '{}' does not match {} format: {}",
                value,
                self.as_str(),
                e
            ))
        })
    }
}

impl std::str::FromStr for DateFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "iso" | "ymd" => Ok(Self::Iso),
            "dmy" => Ok(Self::DayMonthYear),
            _ => Err(format!("Unknown date format: {}", s)),
        }
    }
}

/// Calendar features derived from one date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub month: u32,
    pub year: i32,
    /// 0 = Monday .. 6 = Sunday
    pub weekday: u32,
    /// ceil(month / 3)
    pub quarter: u32,
    pub is_weekend: bool,
}

impl TemporalFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month();
        let weekday = date.weekday().num_days_from_monday();
        Self {
            month,
            year: date.year(),
            weekday,
            quarter: (month - 1) / 3 + 1,
            is_weekend: weekday >= 5,
        }
    }
}

/// Parse `value` with the caller's format and derive its features
pub fn extract(value: &str, format: DateFormat) -> Result<TemporalFeatures> {
    Ok(TemporalFeatures::from_date(format.parse(value)?))
}

/// Calendar month key as (year, month)
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Sunday-first week of year: days before the year's first Sunday are week 0
pub fn week_of_year(date: NaiveDate) -> (i32, u32) {
    let yday = date.ordinal0();
    let days_from_sunday = date.weekday().num_days_from_sunday();
    (date.year(), (yday + 7 - days_from_sunday) / 7)
}

/// English weekday name for an index where 0 = Monday
pub fn weekday_name(index: u32) -> &'static str {
    match index {
        0 => "Monday",
        1 => "Tuesday",
        2 => "Wednesday",
        3 => "Thursday",
        4 => "Friday",
        5 => "Saturday",
        _ => "Sunday",
    }
}
