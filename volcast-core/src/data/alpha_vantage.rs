//! Alpha Vantage data provider.
//!
//! Fetches daily OHLCV bars from the `TIME_SERIES_DAILY` endpoint. A response
//! without a daily time series means the symbol lookup failed, unless the
//! provider attached a throttling notice instead.

use super::provider::{DataError, FetchResult, MarketDataSource, OutputSize};
use crate::domain::PriceBar;
use chrono::NaiveDate;
use serde::Deserialize;
use reqwest::blocking::RequestBuilder;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Connection settings for the Alpha Vantage client.
#[derive(Debug, Clone)]
pub struct AlphaVantageConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl AlphaVantageConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// `TIME_SERIES_DAILY` response body.
#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, DailyQuote>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyQuote {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

/// Alpha Vantage data provider.
pub struct AlphaVantageProvider {
    client: reqwest::blocking::Client,
    config: AlphaVantageConfig,
}

impl AlphaVantageProvider {
    pub fn new(config: AlphaVantageConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Daily-series request for a symbol; parameters are URL-encoded.
    fn daily_request(&self, symbol: &str, size: OutputSize) -> RequestBuilder {
        self.client.get(&self.config.base_url).query(&[
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("outputsize", size.as_str()),
            ("datatype", "json"),
            ("apikey", self.config.api_key.as_str()),
        ])
    }

    /// Parse the response body into bars, newest first as the provider sends them.
    fn parse_response(symbol: &str, resp: DailyResponse) -> Result<Vec<PriceBar>, DataError> {
        let series = match resp.time_series {
            Some(series) => series,
            None => {
                if let Some(notice) = resp.note.or(resp.information) {
                    return Err(DataError::RateLimited(notice));
                }
                if let Some(msg) = resp.error_message {
                    debug!(symbol, %msg, "provider rejected symbol");
                }
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
        };

        let mut bars = Vec::with_capacity(series.len());
        for (day, quote) in series.into_iter().rev() {
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d").map_err(|e| {
                DataError::ResponseFormatChanged(format!("invalid date '{day}': {e}"))
            })?;
            bars.push(PriceBar {
                date,
                open: parse_field(&day, "open", &quote.open)?,
                high: parse_field(&day, "high", &quote.high)?,
                low: parse_field(&day, "low", &quote.low)?,
                close: parse_field(&day, "close", &quote.close)?,
                volume: parse_field(&day, "volume", &quote.volume)?,
            });
        }

        if bars.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        Ok(bars)
    }
}

fn parse_field(day: &str, name: &str, raw: &str) -> Result<f64, DataError> {
    raw.trim().parse::<f64>().map_err(|e| {
        DataError::ResponseFormatChanged(format!("{name} on {day} is not numeric ('{raw}'): {e}"))
    })
}

impl MarketDataSource for AlphaVantageProvider {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch_daily(&self, symbol: &str, size: OutputSize) -> Result<FetchResult, DataError> {
        debug!(symbol, %size, "requesting daily series");

        // Errors carry the request URL, which includes the API key.
        let resp = self
            .daily_request(symbol, size)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.without_url().to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!(
                "HTTP {status} from Alpha Vantage"
            )));
        }
        if !status.is_success() {
            return Err(DataError::Other(format!("HTTP {status} for {symbol}")));
        }

        let body: DailyResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!(
                "failed to parse response for {symbol}: {}",
                e.without_url()
            ))
        })?;

        let bars = Self::parse_response(symbol, body)?;
        debug!(symbol, rows = bars.len(), "daily series received");
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
        })
    }
}
