//! Volcast Core: volatility model lifecycle for a single ticker.
//!
//! This crate turns daily prices into a volatility forecast:
//! - Domain types (price bars, return series)
//! - Market-data provider trait with an Alpha Vantage client
//! - Parquet-backed price table store
//! - Return-series builder
//! - GARCH(p,q) estimation and analytic variance forecasts
//! - Business-day dated forecast formatting
//! - Timestamped model artifact store
//! - Lifecycle orchestrator tying it together

pub mod config;
pub mod data;
pub mod domain;
pub mod forecast;
pub mod lifecycle;
pub mod model;
pub mod returns;
pub mod store;

pub use config::{ConfigError, Settings};
pub use forecast::{format_forecast, VolatilityForecast};
pub use lifecycle::{LifecycleState, ModelError, VolatilityModel};
pub use model::{FitError, FittedGarch, GarchEstimator, VolatilityEstimator};
pub use returns::{build_returns, InsufficientData};
pub use store::{ModelStore, StoreError};
