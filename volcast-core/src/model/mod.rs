//! Volatility model fitting.
//!
//! The lifecycle consumes estimation through [`VolatilityEstimator`]; the
//! shipped implementation is [`GarchEstimator`].

pub mod garch;
pub mod simplex;

pub use garch::{FittedGarch, GarchEstimator, GarchParams};
pub use simplex::SimplexOptions;

use crate::domain::ReturnSeries;
use thiserror::Error;

/// Estimation failures. Never retried with other lag orders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("lag orders must be at least 1 (got p={p}, q={q})")]
    InvalidOrder { p: usize, q: usize },

    #[error("cannot fit a model to an empty return series")]
    EmptySeries,

    #[error("return series has a non-finite value at position {index}")]
    NonFiniteInput { index: usize },

    #[error("return series has zero variance")]
    DegenerateSeries,

    #[error("estimation failed: {0}")]
    Estimation(String),
}

/// Fits a conditional-variance model of order (p, q) to a return series.
///
/// Innovations are assumed symmetric and the series is used as given (no
/// internal rescaling); the input is never mutated.
pub trait VolatilityEstimator: Send + Sync {
    fn fit(&self, series: &ReturnSeries, p: usize, q: usize) -> Result<FittedGarch, FitError>;
}
