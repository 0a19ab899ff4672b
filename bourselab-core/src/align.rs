//! Multi-series date alignment.
//!
//! Given any number of date-indexed frames, restrict all of them to the
//! set intersection of their date indices and concatenate into a single
//! wide table. There is no partial-overlap fallback: an empty intersection
//! is a fatal condition for the run. Rows that still carry a gap after
//! concatenation are dropped, never imputed, so the result can be smaller
//! than the raw intersection.

use crate::frame::Frame;
use crate::report::{InputSpan, OverlapReport};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("no overlapping dates found across datasets")]
    NoOverlap,
}

/// An aligned wide table plus the overlap accounting that produced it.
#[derive(Debug)]
pub struct Aligned {
    pub frame: Frame,
    pub report: OverlapReport,
}

/// Intersect the date indices of all inputs and project every input onto
/// the common index. Every cell of the result is populated.
pub fn align(inputs: &[Frame]) -> Result<Aligned, AlignError> {
    let mut spans = Vec::with_capacity(inputs.len());
    for frame in inputs {
        let (Some(start), Some(end)) = (frame.first_date(), frame.last_date()) else {
            return Err(AlignError::NoOverlap);
        };
        spans.push(InputSpan {
            label: frame.column_names().join("+"),
            start,
            end,
            rows: frame.len(),
        });
    }

    let mut iter = inputs.iter();
    let Some(first) = iter.next() else {
        return Err(AlignError::NoOverlap);
    };
    let mut common: BTreeSet<NaiveDate> = first.date_set();
    for frame in iter {
        common = common.intersection(&frame.date_set()).copied().collect();
    }

    if common.is_empty() {
        return Err(AlignError::NoOverlap);
    }

    let mut combined = inputs[0].restrict_to(&common);
    for frame in &inputs[1..] {
        combined = combined.hstack(&frame.restrict_to(&common));
    }
    let combined = combined.drop_incomplete_rows();

    let report = OverlapReport {
        inputs: spans,
        common_dates: common.len(),
        aligned_rows: combined.len(),
    };
    info!(
        common_dates = report.common_dates,
        aligned_rows = report.aligned_rows,
        "aligned datasets"
    );

    Ok(Aligned {
        frame: combined,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
    }

    fn frame(name: &str, cells: &[(u32, Option<f64>)]) -> Frame {
        Frame::new(
            cells.iter().map(|(day, _)| d(*day)).collect(),
            vec![Column {
                name: name.into(),
                values: cells.iter().map(|(_, v)| *v).collect(),
            }],
        )
    }

    fn full(name: &str, days: &[u32]) -> Frame {
        frame(
            name,
            &days.iter().map(|&day| (day, Some(day as f64))).collect::<Vec<_>>(),
        )
    }

    #[test]
    fn output_index_is_the_intersection() {
        let a = full("a", &[1, 2, 3, 4]);
        let b = full("b", &[2, 3, 4, 5]);
        let c = full("c", &[3, 4, 5, 6]);
        let out = align(&[a, b, c]).unwrap();
        assert_eq!(out.frame.dates(), &[d(3), d(4)]);
        assert_eq!(out.frame.column_names(), vec!["a", "b", "c"]);
        assert_eq!(out.report.common_dates, 2);
        assert_eq!(out.report.aligned_rows, 2);
    }

    #[test]
    fn missing_date_in_one_input_is_excluded() {
        // Four series share D1..D10 but one is missing D5.
        let all: Vec<u32> = (1..=10).collect();
        let without_d5: Vec<u32> = all.iter().copied().filter(|&x| x != 5).collect();
        let out = align(&[
            full("stocks", &all),
            full("market", &all),
            full("risk_free", &without_d5),
            full("fx", &all),
        ])
        .unwrap();
        assert_eq!(out.frame.len(), 9);
        assert!(!out.frame.dates().contains(&d(5)));
    }

    #[test]
    fn residual_gaps_inside_the_intersection_are_dropped() {
        let a = frame("a", &[(1, Some(1.0)), (2, None), (3, Some(3.0))]);
        let b = full("b", &[1, 2, 3]);
        let out = align(&[a, b]).unwrap();
        assert_eq!(out.report.common_dates, 3);
        assert_eq!(out.frame.dates(), &[d(1), d(3)]);
    }

    #[test]
    fn disjoint_inputs_fail() {
        let a = full("a", &[1, 2]);
        let b = full("b", &[3, 4]);
        assert!(matches!(align(&[a, b]), Err(AlignError::NoOverlap)));
    }

    #[test]
    fn empty_input_fails() {
        let a = full("a", &[1, 2]);
        let b = full("b", &[]);
        assert!(matches!(align(&[a, b]), Err(AlignError::NoOverlap)));
    }
}
