//! Market-data source trait and structured error types.
//!
//! The MarketDataSource trait abstracts over daily-price providers so the
//! lifecycle can be driven by Alpha Vantage in production and by a canned
//! source in tests.

use crate::domain::PriceBar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Structured error types for data operations (provider and table store).
///
/// These are designed to be displayable in CLI output verbatim.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("invalid API call, check that ticker symbol '{symbol}' is correct")]
    SymbolNotFound { symbol: String },

    #[error("table '{table}' does not exist")]
    TableNotFound { table: String },

    #[error("table '{table}' already exists")]
    TableExists { table: String },

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("data error: {0}")]
    Other(String),
}

/// How much history to request from the provider.
///
/// `Compact` returns roughly the latest 100 sessions; `Full` returns the
/// whole available history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSize {
    Compact,
    #[default]
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputSize {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(OutputSize::Compact),
            "full" => Ok(OutputSize::Full),
            other => Err(DataError::Other(format!(
                "unknown output size '{other}' (expected compact or full)"
            ))),
        }
    }
}

/// Result of a successful daily fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    /// Bars in the order the provider returned them (not necessarily sorted).
    pub bars: Vec<PriceBar>,
}

/// Trait for daily market-data providers.
///
/// Implementations never retry; every failure is reported to the caller.
pub trait MarketDataSource: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily OHLCV bars for a symbol.
    fn fetch_daily(&self, symbol: &str, size: OutputSize) -> Result<FetchResult, DataError>;
}
