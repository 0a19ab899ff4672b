//! Feature/target construction and the chronological split.
//!
//! Features are per-symbol daily returns; the target matrix carries three
//! factors: excess market return, market-cap percentage change, and
//! exchange-rate percentage change. The split is strictly chronological —
//! no shuffling, no stratification — so training data always precedes the
//! test window.

use crate::align::{self, AlignError};
use crate::frame::{Column, Frame};
use crate::report::OverlapReport;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Fraction of rows assigned to the test window (suffix).
pub const TEST_FRACTION: f64 = 0.33;

pub const EXCESS_RETURN: &str = "excess_return";
pub const MARKET_CAP_CHANGE: &str = "market_cap_change";
pub const USD_TO_RIAL_CHANGE: &str = "usd_to_rial_change";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Align(#[from] AlignError),

    #[error("no overlapping data between features and targets")]
    EmptyIntersection,
}

/// Chronologically split feature/target tables sharing one date ordering.
#[derive(Debug)]
pub struct Split {
    pub x_train: Frame,
    pub x_test: Frame,
    pub y_train: Frame,
    pub y_test: Frame,
}

/// Output of the build step: the split plus alignment accounting.
#[derive(Debug)]
pub struct FeatureTarget {
    pub split: Split,
    pub overlap: OverlapReport,
}

/// Project one column of `frame` onto `dates`, as optional cells.
fn column_on_index(frame: &Frame, name: &str, dates: &[NaiveDate]) -> Vec<Option<f64>> {
    let lookup: BTreeMap<NaiveDate, f64> = frame.column_by_date(name);
    dates.iter().map(|d| lookup.get(d).copied()).collect()
}

/// Build the feature and target matrices and split them chronologically.
///
/// `prices` is the combined close-price table (one column per symbol);
/// the four externals are single-column frames named by their canonical
/// field. The market-cap and exchange-rate factors are percentage changes
/// computed on the unrestricted series, projected onto the aligned index,
/// and backward-filled — the one place the pipeline imputes instead of
/// dropping, recovering the row lost to differencing.
pub fn build(
    prices: &Frame,
    market: &Frame,
    risk_free: &Frame,
    market_cap: &Frame,
    usd_to_rial: &Frame,
) -> Result<FeatureTarget, BuildError> {
    let stock_returns = prices.pct_change();

    let aligned = align::align(&[
        stock_returns.clone(),
        market.clone(),
        risk_free.clone(),
        market_cap.clone(),
        usd_to_rial.clone(),
    ])?;
    let index = aligned.frame.date_set();
    let index_dates: Vec<NaiveDate> = aligned.frame.dates().to_vec();

    let x = stock_returns.restrict_to(&index);

    // Excess return: market minus risk-free, both on the aligned index.
    // Every cell on the aligned index is populated by construction.
    let market_col = column_on_index(market, column_name(market), &index_dates);
    let risk_free_col = column_on_index(risk_free, column_name(risk_free), &index_dates);
    let excess: Vec<Option<f64>> = market_col
        .iter()
        .zip(&risk_free_col)
        .map(|(m, r)| match (m, r) {
            (Some(m), Some(r)) => Some(m - r),
            _ => None,
        })
        .collect();

    let market_cap_change = market_cap.pct_change();
    let usd_change = usd_to_rial.pct_change();

    let y = Frame::new(
        index_dates.clone(),
        vec![
            Column {
                name: EXCESS_RETURN.to_string(),
                values: excess,
            },
            Column {
                name: MARKET_CAP_CHANGE.to_string(),
                values: column_on_index(
                    &market_cap_change,
                    column_name(market_cap),
                    &index_dates,
                ),
            },
            Column {
                name: USD_TO_RIAL_CHANGE.to_string(),
                values: column_on_index(&usd_change, column_name(usd_to_rial), &index_dates),
            },
        ],
    )
    .fill_backward()
    .drop_incomplete_rows();

    // y construction may have dropped rows X still has.
    let x = x.restrict_to(&y.date_set());
    if x.is_empty() {
        return Err(BuildError::EmptyIntersection);
    }

    let split = chronological_split(&x, &y, TEST_FRACTION);
    info!(
        train_rows = split.x_train.len(),
        test_rows = split.x_test.len(),
        symbols = split.x_train.columns().len(),
        "built feature/target split"
    );

    Ok(FeatureTarget {
        split,
        overlap: aligned.report,
    })
}

/// Strict prefix/suffix split by row order. The test window takes
/// `ceil(fraction * rows)` rows from the end.
pub fn chronological_split(x: &Frame, y: &Frame, test_fraction: f64) -> Split {
    let n = x.len();
    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    Split {
        x_train: x.slice(0, n_train),
        x_test: x.slice(n_train, n_test),
        y_train: y.slice(0, n_train),
        y_test: y.slice(n_train, n_test),
    }
}

/// Name of the single value column of an external series frame.
fn column_name(frame: &Frame) -> &str {
    frame.columns().first().map(|c| c.name.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 3, day).unwrap()
    }

    fn series(name: &str, cells: &[(u32, f64)]) -> Frame {
        let points: Vec<(NaiveDate, f64)> =
            cells.iter().map(|(day, v)| (d(*day), *v)).collect();
        Frame::from_points(name, &points)
    }

    fn inputs() -> (Frame, Frame, Frame, Frame, Frame) {
        let days: Vec<u32> = (1..=12).collect();
        let prices = {
            let a: Vec<(u32, f64)> = days.iter().map(|&x| (x, 100.0 + x as f64)).collect();
            let b: Vec<(u32, f64)> = days.iter().map(|&x| (x, 50.0 + 2.0 * x as f64)).collect();
            series("sym_a", &a).hstack(&series("sym_b", &b))
        };
        let market = series(
            "daily_return",
            &days.iter().map(|&x| (x, 0.01)).collect::<Vec<_>>(),
        );
        let risk_free = series(
            "risk_free_rate",
            &days.iter().map(|&x| (x, 0.002)).collect::<Vec<_>>(),
        );
        let market_cap = series(
            "market_cap",
            &days.iter().map(|&x| (x, 1000.0 + 10.0 * x as f64)).collect::<Vec<_>>(),
        );
        let usd = series(
            "usd_to_rial",
            &days.iter().map(|&x| (x, 40_000.0 + 100.0 * x as f64)).collect::<Vec<_>>(),
        );
        (prices, market, risk_free, market_cap, usd)
    }

    #[test]
    fn split_is_chronological_and_two_thirds() {
        let (prices, market, risk_free, market_cap, usd) = inputs();
        let ft = build(&prices, &market, &risk_free, &market_cap, &usd).unwrap();
        let s = &ft.split;

        let n = s.x_train.len() + s.x_test.len();
        let ratio = s.x_train.len() as f64 / n as f64;
        assert!((ratio - 0.67).abs() < 1.0 / n as f64 + 0.01);
        assert!(s.x_train.last_date().unwrap() < s.x_test.first_date().unwrap());
        assert_eq!(s.y_train.len(), s.x_train.len());
        assert_eq!(s.y_test.len(), s.x_test.len());
    }

    #[test]
    fn first_price_row_is_lost_to_differencing() {
        let (prices, market, risk_free, market_cap, usd) = inputs();
        let ft = build(&prices, &market, &risk_free, &market_cap, &usd).unwrap();
        let total = ft.split.x_train.len() + ft.split.x_test.len();
        // 12 input days, one lost to the return computation.
        assert_eq!(total, 11);
        assert_eq!(ft.split.x_train.first_date(), Some(d(2)));
    }

    #[test]
    fn leading_factor_gap_is_backfilled_not_dropped() {
        let (prices, market, risk_free, _, usd) = inputs();
        // Market cap starts two days after the prices, so the aligned
        // index begins at its first date — which has no pct-change value.
        let market_cap = series(
            "market_cap",
            &(3..=12).map(|x| (x, 1000.0 + 10.0 * x as f64)).collect::<Vec<_>>(),
        );
        let ft = build(&prices, &market, &risk_free, &market_cap, &usd).unwrap();
        let s = &ft.split;
        // The leading row survives: its market-cap change is backfilled
        // with the next day's change rather than dropped.
        assert_eq!(s.x_train.first_date(), Some(d(3)));
        assert_eq!(s.x_train.len() + s.x_test.len(), 10);
        let y_first = s.y_train.column(MARKET_CAP_CHANGE).unwrap().values[0].unwrap();
        assert!((y_first - 10.0 / 1030.0).abs() < 1e-12);
        let y_second = s.y_train.column(MARKET_CAP_CHANGE).unwrap().values[1].unwrap();
        assert!((y_second - 10.0 / 1030.0).abs() < 1e-12);
    }

    #[test]
    fn y_columns_are_the_three_factors() {
        let (prices, market, risk_free, market_cap, usd) = inputs();
        let ft = build(&prices, &market, &risk_free, &market_cap, &usd).unwrap();
        assert_eq!(
            ft.split.y_train.column_names(),
            vec![EXCESS_RETURN, MARKET_CAP_CHANGE, USD_TO_RIAL_CHANGE]
        );
        let excess = ft.split.y_train.column(EXCESS_RETURN).unwrap().values[0].unwrap();
        assert!((excess - 0.008).abs() < 1e-12);
    }

    #[test]
    fn disjoint_calendars_are_fatal() {
        let (prices, market, risk_free, market_cap, _) = inputs();
        let usd = series("usd_to_rial", &[(20, 1.0), (21, 1.1)]);
        let err = build(&prices, &market, &risk_free, &market_cap, &usd).unwrap_err();
        assert!(matches!(err, BuildError::Align(AlignError::NoOverlap)));
    }

    #[test]
    fn split_sizes_partition_the_rows() {
        let x = series("a", &(1..=10).map(|x| (x, x as f64)).collect::<Vec<_>>());
        let y = series("b", &(1..=10).map(|x| (x, x as f64)).collect::<Vec<_>>());
        let s = chronological_split(&x, &y, TEST_FRACTION);
        assert_eq!(s.x_train.len() + s.x_test.len(), 10);
        // ceil(10 * 0.33) = 4 test rows.
        assert_eq!(s.x_test.len(), 4);
        assert_eq!(s.x_train.len(), 6);
    }
}
