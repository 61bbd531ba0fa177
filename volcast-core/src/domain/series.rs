//! ReturnSeries: dated percentage returns, oldest first.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One close-to-close percentage return, dated by the later close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub pct_return: f64,
}

/// Ordered percentage-return series used as model input.
///
/// Invariants (upheld by [`crate::returns::build_returns`]): dates strictly
/// increasing, every value finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    pub(crate) fn from_points(points: Vec<ReturnPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    /// Return values without dates, in date order.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.pct_return).collect()
    }

    /// Date of the first return, if any.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    /// Date of the last return, which anchors forecasts.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}
