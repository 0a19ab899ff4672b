//! Date-indexed wide table shared by every pipeline stage.
//!
//! A [`Frame`] is a strictly-increasing date axis plus named value columns
//! of equal length. Cells are `Option<f64>`; aligned output guarantees
//! every cell is populated, but intermediate frames may carry gaps.
//!
//! Frames are immutable: every operation returns a new frame, and each
//! stage owns and fully replaces its output.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// A named column of optional values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Date-indexed wide table.
///
/// Invariants (upheld by all constructors in this crate, checked in debug
/// builds): dates strictly increasing, every column the same length as the
/// date axis, column names unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<Column>) -> Self {
        debug_assert!(dates.windows(2).all(|w| w[0] < w[1]), "dates must be strictly increasing");
        debug_assert!(columns.iter().all(|c| c.values.len() == dates.len()));
        debug_assert!({
            let names: BTreeSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            names.len() == columns.len()
        });
        Self { dates, columns }
    }

    /// Single-column frame from already sorted, de-duplicated points.
    pub fn from_points(name: &str, points: &[(NaiveDate, f64)]) -> Self {
        Self::new(
            points.iter().map(|(d, _)| *d).collect(),
            vec![Column {
                name: name.to_string(),
                values: points.iter().map(|(_, v)| Some(*v)).collect(),
            }],
        )
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn date_set(&self) -> BTreeSet<NaiveDate> {
        self.dates.iter().copied().collect()
    }

    /// Lookup map for one column: date → value (populated cells only).
    pub fn column_by_date(&self, name: &str) -> BTreeMap<NaiveDate, f64> {
        let mut map = BTreeMap::new();
        if let Some(col) = self.column(name) {
            for (date, value) in self.dates.iter().zip(&col.values) {
                if let Some(v) = value {
                    map.insert(*date, *v);
                }
            }
        }
        map
    }

    /// Keep only the rows whose date is in `keep`. Preserves order.
    pub fn restrict_to(&self, keep: &BTreeSet<NaiveDate>) -> Frame {
        let idx: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| keep.contains(d))
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&idx)
    }

    /// Drop every row that has at least one unpopulated cell.
    pub fn drop_incomplete_rows(&self) -> Frame {
        let idx: Vec<usize> = (0..self.dates.len())
            .filter(|&i| self.columns.iter().all(|c| c.values[i].is_some()))
            .collect();
        self.take_rows(&idx)
    }

    /// Period-over-period simple returns per column. The first row is
    /// dropped (a return needs a prior observation). A cell is unpopulated
    /// when either observation is missing or the prior value is zero.
    pub fn pct_change(&self) -> Frame {
        if self.dates.len() < 2 {
            return Frame::new(
                Vec::new(),
                self.columns
                    .iter()
                    .map(|c| Column {
                        name: c.name.clone(),
                        values: Vec::new(),
                    })
                    .collect(),
            );
        }
        let dates = self.dates[1..].to_vec();
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c
                    .values
                    .windows(2)
                    .map(|w| match (w[0], w[1]) {
                        (Some(prev), Some(curr)) if prev != 0.0 => Some((curr - prev) / prev),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();
        Frame::new(dates, columns)
    }

    /// Fill unpopulated cells by propagating the next populated value
    /// backward (trailing gaps stay unpopulated).
    pub fn fill_backward(&self) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut values = c.values.clone();
                let mut next: Option<f64> = None;
                for v in values.iter_mut().rev() {
                    match v {
                        Some(x) => next = Some(*x),
                        None => *v = next,
                    }
                }
                Column {
                    name: c.name.clone(),
                    values,
                }
            })
            .collect();
        Frame::new(self.dates.clone(), columns)
    }

    /// Horizontally concatenate with another frame sharing the same date
    /// axis. Callers must align both frames first.
    pub fn hstack(&self, other: &Frame) -> Frame {
        debug_assert_eq!(self.dates, other.dates, "hstack requires identical date axes");
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Frame::new(self.dates.clone(), columns)
    }

    /// Inner join on date: restrict both frames to their common dates and
    /// concatenate columns.
    pub fn inner_join(&self, other: &Frame) -> Frame {
        let common: BTreeSet<NaiveDate> = self
            .date_set()
            .intersection(&other.date_set())
            .copied()
            .collect();
        self.restrict_to(&common).hstack(&other.restrict_to(&common))
    }

    /// Contiguous row slice `[offset, offset + len)`, clamped to bounds.
    pub fn slice(&self, offset: usize, len: usize) -> Frame {
        let end = (offset + len).min(self.dates.len());
        let offset = offset.min(end);
        let idx: Vec<usize> = (offset..end).collect();
        self.take_rows(&idx)
    }

    fn take_rows(&self, idx: &[usize]) -> Frame {
        Frame::new(
            idx.iter().map(|&i| self.dates[i]).collect(),
            self.columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: idx.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        )
    }
}
