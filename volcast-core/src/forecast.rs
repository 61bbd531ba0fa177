//! Forecast formatting: raw variance path → business-day dated volatility.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Volatility forecast keyed by ISO-8601 calendar date (`YYYY-MM-DD`).
///
/// Keys sort lexicographically in date order, so iteration is chronological.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolatilityForecast(BTreeMap<String, f64>);

impl VolatilityForecast {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Volatility for a `YYYY-MM-DD` date, if forecast.
    pub fn get(&self, date: &str) -> Option<f64> {
        self.0.get(date).copied()
    }

    /// Entries in date order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(d, v)| (d.as_str(), *v))
    }

    pub fn into_inner(self) -> BTreeMap<String, f64> {
        self.0
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The `count` Monday–Friday dates strictly after `after`.
///
/// No holiday calendar is consulted.
pub fn business_days_after(after: NaiveDate, count: usize) -> Vec<NaiveDate> {
    after
        .iter_days()
        .skip(1)
        .filter(|d| !is_weekend(*d))
        .take(count)
        .collect()
}

/// Convert an h-step variance path anchored at `last_date` into a dated
/// volatility forecast; the horizon is the length of `variances`.
///
/// Variances come from a fitted model and are non-negative by construction,
/// so the square root is applied without further checks.
pub fn format_forecast(variances: &[f64], last_date: NaiveDate) -> VolatilityForecast {
    let dates = business_days_after(last_date, variances.len());
    VolatilityForecast(
        dates
            .into_iter()
            .zip(variances)
            .map(|(date, var)| (date.format("%Y-%m-%d").to_string(), var.sqrt()))
            .collect(),
    )
}
