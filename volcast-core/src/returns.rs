//! Return-series builder: price table → cleaned percentage returns.

use crate::domain::{PriceBar, ReturnPoint, ReturnSeries};
use thiserror::Error;

/// Not enough usable price rows to compute a single return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient data: {available} usable price rows, need at least 2")]
pub struct InsufficientData {
    pub available: usize,
}

/// Build a percentage-return series from raw daily bars.
///
/// Only the `max_observations + 1` most recent bars are used (one extra row
/// is consumed by the first difference). Bars are sorted ascending by date
/// first since store and provider order is not guaranteed; a duplicated date
/// keeps its first occurrence. Returns that are not finite (missing or zero
/// closes) are dropped, so the result never contains gaps.
pub fn build_returns(
    bars: &[PriceBar],
    max_observations: usize,
) -> Result<ReturnSeries, InsufficientData> {
    let mut sorted: Vec<&PriceBar> = bars.iter().collect();
    sorted.sort_by_key(|b| b.date);
    sorted.dedup_by_key(|b| b.date);

    let keep = max_observations.saturating_add(1);
    let window = &sorted[sorted.len().saturating_sub(keep)..];
    if window.len() < 2 {
        return Err(InsufficientData {
            available: window.len(),
        });
    }

    let points: Vec<ReturnPoint> = window
        .windows(2)
        .map(|pair| ReturnPoint {
            date: pair[1].date,
            pct_return: (pair[1].close / pair[0].close - 1.0) * 100.0,
        })
        .filter(|p| p.pct_return.is_finite())
        .collect();

    if points.is_empty() {
        return Err(InsufficientData { available: 0 });
    }

    Ok(ReturnSeries::from_points(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(y: i32, m: u32, d: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    #[test]
    fn close_to_close_percentage_returns() {
        let bars = vec![
            bar(2024, 1, 1, 100.0),
            bar(2024, 1, 2, 102.0),
            bar(2024, 1, 3, 99.0),
        ];
        let series = build_returns(&bars, 10).unwrap();

        assert_eq!(series.len(), 2);
        let values = series.values();
        assert!((values[0] - 2.0).abs() < 1e-9);
        assert!((values[1] - (-2.9412)).abs() < 1e-4);
        assert_eq!(series.first_date(), NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(series.last_date(), NaiveDate::from_ymd_opt(2024, 1, 3));
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let bars = vec![
            bar(2024, 1, 3, 99.0),
            bar(2024, 1, 1, 100.0),
            bar(2024, 1, 2, 102.0),
        ];
        let series = build_returns(&bars, 10).unwrap();
        assert!((series.values()[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn window_keeps_most_recent_observations() {
        let bars: Vec<PriceBar> = (1..=10)
            .map(|d| bar(2024, 1, d, 100.0 + d as f64))
            .collect();
        let series = build_returns(&bars, 3).unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.first_date(), NaiveDate::from_ymd_opt(2024, 1, 8));
    }

    #[test]
    fn fewer_than_two_rows_is_insufficient() {
        assert_eq!(
            build_returns(&[], 5).unwrap_err(),
            InsufficientData { available: 0 }
        );
        assert_eq!(
            build_returns(&[bar(2024, 1, 1, 100.0)], 5).unwrap_err(),
            InsufficientData { available: 1 }
        );
    }

    #[test]
    fn zero_observation_window_is_insufficient() {
        let bars = vec![bar(2024, 1, 1, 100.0), bar(2024, 1, 2, 101.0)];
        assert!(build_returns(&bars, 0).is_err());
    }

    #[test]
    fn non_finite_returns_are_dropped() {
        let bars = vec![
            bar(2024, 1, 1, 100.0),
            bar(2024, 1, 2, f64::NAN),
            bar(2024, 1, 3, 99.0),
            bar(2024, 1, 4, 101.0),
        ];
        let series = build_returns(&bars, 10).unwrap();

        assert_eq!(series.len(), 1);
        assert!(series.values().iter().all(|v| v.is_finite()));
    }
}
