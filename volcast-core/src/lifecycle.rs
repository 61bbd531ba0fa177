//! Model lifecycle: prepare data, fit, forecast, persist, restore.
//!
//! [`VolatilityModel`] is the single entry point callers use. It owns the
//! return series and the current fitted model for one ticker; everything it
//! touches outside itself (market data, price tables, model artifacts) is a
//! collaborator handed in at construction.
//!
//! ```text
//! Uninitialized ──prepare──▶ DataReady ──fit──▶ Fitted ──▶ forecast / persist
//!        │                                        ▲
//!        └──────────────── restore ───────────────┘
//! ```

use crate::data::{DataError, MarketDataSource, OutputSize, TableStore, WriteMode};
use crate::domain::{ReturnSeries, Ticker};
use crate::forecast::{format_forecast, VolatilityForecast};
use crate::model::{FitError, FittedGarch, GarchEstimator, VolatilityEstimator};
use crate::returns::{build_returns, InsufficientData};
use crate::store::{ModelStore, StoreError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by the lifecycle. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    InsufficientData(#[from] InsufficientData),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no data prepared for '{ticker}': call prepare() before fit()")]
    NoData { ticker: String },

    #[error("no model for '{ticker}': call fit() or restore() first")]
    NotFitted { ticker: String },
}

impl ModelError {
    /// True when no artifact has ever been saved for the ticker.
    pub fn is_model_not_found(&self) -> bool {
        matches!(self, ModelError::Store(StoreError::ModelNotFound { .. }))
    }
}

/// Where a [`VolatilityModel`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    DataReady,
    Fitted,
}

/// Volatility model for one ticker.
pub struct VolatilityModel<'a> {
    ticker: Ticker,
    repo: &'a dyn TableStore,
    source: &'a dyn MarketDataSource,
    store: &'a ModelStore,
    use_new_data: bool,
    output_size: OutputSize,
    estimator: Box<dyn VolatilityEstimator + 'a>,
    data: Option<ReturnSeries>,
    model: Option<FittedGarch>,
}

impl<'a> VolatilityModel<'a> {
    /// `use_new_data` makes every `prepare` refresh the ticker's table from
    /// `source` before reading it.
    pub fn new(
        ticker: impl Into<Ticker>,
        repo: &'a dyn TableStore,
        source: &'a dyn MarketDataSource,
        store: &'a ModelStore,
        use_new_data: bool,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            repo,
            source,
            store,
            use_new_data,
            output_size: OutputSize::Full,
            estimator: Box::new(GarchEstimator::default()),
            data: None,
            model: None,
        }
    }

    /// History depth requested on refresh (default `Full`).
    pub fn with_output_size(mut self, size: OutputSize) -> Self {
        self.output_size = size;
        self
    }

    /// Swap the estimator used by [`Self::fit`].
    pub fn with_estimator(mut self, estimator: impl VolatilityEstimator + 'a) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn state(&self) -> LifecycleState {
        match (&self.model, &self.data) {
            (Some(_), _) => LifecycleState::Fitted,
            (None, Some(_)) => LifecycleState::DataReady,
            (None, None) => LifecycleState::Uninitialized,
        }
    }

    /// The prepared return series, if any.
    pub fn data(&self) -> Option<&ReturnSeries> {
        self.data.as_ref()
    }

    /// The current fitted or restored model, if any.
    pub fn model(&self) -> Option<&FittedGarch> {
        self.model.as_ref()
    }

    /// Load training data and build the return series.
    ///
    /// With `use_new_data`, the ticker's table is fully replaced by a fresh
    /// download first; history outside the downloaded window is dropped.
    /// Reads the `n_observations + 1` most recent rows.
    pub fn prepare(&mut self, n_observations: usize) -> Result<&ReturnSeries, ModelError> {
        if self.use_new_data {
            let fetched = self.source.fetch_daily(&self.ticker, self.output_size)?;
            if self.output_size == OutputSize::Compact {
                warn!(
                    ticker = %self.ticker,
                    "refreshing with compact history replaces the stored table with ~100 rows"
                );
            }
            let written = self
                .repo
                .write(&self.ticker, &fetched.bars, WriteMode::Replace)?;
            info!(ticker = %self.ticker, source = self.source.name(), written, "price table refreshed");
        }

        let limit = n_observations.saturating_add(1);
        let rows = self.repo.read(&self.ticker, Some(limit))?;
        let suspect = rows.iter().filter(|b| !b.is_sane()).count();
        if suspect > 0 {
            warn!(ticker = %self.ticker, suspect, "price rows failing OHLC sanity checks");
        }
        let series = build_returns(&rows, n_observations)?;
        debug!(
            ticker = %self.ticker,
            rows = rows.len(),
            returns = series.len(),
            "return series built"
        );

        Ok(self.data.insert(series))
    }

    /// Fit a GARCH(p, q) model to the prepared series, replacing any current model.
    pub fn fit(&mut self, p: usize, q: usize) -> Result<&FittedGarch, ModelError> {
        let series = self.data.as_ref().ok_or_else(|| ModelError::NoData {
            ticker: self.ticker.clone(),
        })?;
        let model = self.estimator.fit(series, p, q)?;
        info!(
            ticker = %self.ticker,
            p,
            q,
            n_obs = model.n_obs,
            log_likelihood = model.log_likelihood,
            converged = model.converged,
            "model fitted"
        );
        Ok(self.model.insert(model))
    }

    /// Dated volatility forecast for the `horizon` business days after the
    /// model's last training date.
    pub fn forecast_volatility(&self, horizon: usize) -> Result<VolatilityForecast, ModelError> {
        let model = self.require_model()?;
        let variances = model.forecast_variance(horizon);
        Ok(format_forecast(&variances, model.last_date))
    }

    /// Save the current model; returns the artifact path.
    pub fn persist(&self) -> Result<PathBuf, ModelError> {
        let model = self.require_model()?;
        Ok(self.store.save(&self.ticker, model)?)
    }

    /// Replace the current model with the latest saved one for this ticker.
    pub fn restore(&mut self) -> Result<&FittedGarch, ModelError> {
        let model = self.store.load_latest(&self.ticker)?;
        info!(ticker = %self.ticker, last_date = %model.last_date, "model restored");
        Ok(self.model.insert(model))
    }

    fn require_model(&self) -> Result<&FittedGarch, ModelError> {
        self.model.as_ref().ok_or_else(|| ModelError::NotFitted {
            ticker: self.ticker.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FetchResult;
    use crate::domain::PriceBar;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// In-memory table store.
    #[derive(Default)]
    struct MemoryStore {
        tables: Mutex<std::collections::HashMap<String, Vec<PriceBar>>>,
    }

    impl TableStore for MemoryStore {
        fn write(
            &self,
            table: &str,
            rows: &[PriceBar],
            _mode: WriteMode,
        ) -> Result<usize, DataError> {
            self.tables
                .lock()
                .unwrap()
                .insert(table.to_string(), rows.to_vec());
            Ok(rows.len())
        }

        fn read(&self, table: &str, limit: Option<usize>) -> Result<Vec<PriceBar>, DataError> {
            let tables = self.tables.lock().unwrap();
            let mut rows = tables
                .get(table)
                .cloned()
                .ok_or_else(|| DataError::TableNotFound {
                    table: table.to_string(),
                })?;
            rows.sort_by_key(|b| b.date);
            let skip = limit.map_or(0, |n| rows.len().saturating_sub(n));
            Ok(rows.split_off(skip))
        }

        fn exists(&self, table: &str) -> bool {
            self.tables.lock().unwrap().contains_key(table)
        }
    }

    struct NoSource;

    impl MarketDataSource for NoSource {
        fn name(&self) -> &str {
            "none"
        }

        fn fetch_daily(&self, symbol: &str, _size: OutputSize) -> Result<FetchResult, DataError> {
            Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
    }

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    fn model_store() -> ModelStore {
        ModelStore::new(std::env::temp_dir().join(format!(
            "volcast_lifecycle_unit_{}",
            std::process::id()
        )))
    }

    #[test]
    fn starts_uninitialized_and_refuses_forecast() {
        let repo = MemoryStore::default();
        let store = model_store();
        let model = VolatilityModel::new("SPY", &repo, &NoSource, &store, false);

        assert_eq!(model.state(), LifecycleState::Uninitialized);
        assert!(matches!(
            model.forecast_volatility(5),
            Err(ModelError::NotFitted { .. })
        ));
        assert!(matches!(model.persist(), Err(ModelError::NotFitted { .. })));
    }

    #[test]
    fn fit_before_prepare_is_no_data() {
        let repo = MemoryStore::default();
        let store = model_store();
        let mut model = VolatilityModel::new("SPY", &repo, &NoSource, &store, false);

        assert!(matches!(model.fit(1, 1), Err(ModelError::NoData { .. })));
    }

    #[test]
    fn prepare_reads_without_refresh() {
        let repo = MemoryStore::default();
        repo.write(
            "SPY",
            &[bar(3, 99.0), bar(1, 100.0), bar(2, 102.0)],
            WriteMode::Replace,
        )
        .unwrap();
        let store = model_store();
        let mut model = VolatilityModel::new("SPY", &repo, &NoSource, &store, false);

        let series = model.prepare(2).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(model.state(), LifecycleState::DataReady);
    }

    #[test]
    fn refresh_failure_propagates_source_error() {
        let repo = MemoryStore::default();
        let store = model_store();
        let mut model = VolatilityModel::new("BOGUS", &repo, &NoSource, &store, true);

        let err = model.prepare(10).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Data(DataError::SymbolNotFound { ref symbol }) if symbol == "BOGUS"
        ));
        assert_eq!(model.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn single_row_is_insufficient() {
        let repo = MemoryStore::default();
        repo.write("SPY", &[bar(1, 100.0)], WriteMode::Replace).unwrap();
        let store = model_store();
        let mut model = VolatilityModel::new("SPY", &repo, &NoSource, &store, false);

        assert!(matches!(
            model.prepare(10),
            Err(ModelError::InsufficientData(InsufficientData { available: 1 }))
        ));
    }

    #[test]
    fn invalid_orders_surface_as_fit_errors() {
        let repo = MemoryStore::default();
        repo.write(
            "SPY",
            &[bar(1, 100.0), bar(2, 102.0), bar(3, 99.0)],
            WriteMode::Replace,
        )
        .unwrap();
        let store = model_store();
        let mut model = VolatilityModel::new("SPY", &repo, &NoSource, &store, false);
        model.prepare(10).unwrap();

        assert!(matches!(
            model.fit(0, 1),
            Err(ModelError::Fit(FitError::InvalidOrder { .. }))
        ));
        assert_eq!(model.state(), LifecycleState::DataReady);
    }
}
