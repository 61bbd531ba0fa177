//! Domain types: price observations and return series.

pub mod bar;
pub mod series;

pub use bar::PriceBar;
pub use series::{ReturnPoint, ReturnSeries};

/// Ticker symbol type alias
pub type Ticker = String;
