//! Per-stage summaries and the injectable progress sink.
//!
//! "How many rows were dropped and why" is a first-class output of every
//! loading stage, not a side effect of logging. Pipeline progress events
//! flow through [`PipelineObserver`] so stages stay testable without
//! capturing console output.

use crate::loader::DatasetKind;
use crate::source::SourceError;
use chrono::NaiveDate;
use serde::Serialize;

/// Rows discarded by a cleaning stage, by reason.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowDrops {
    /// Date missing, unrecognized, or out of range.
    pub undated: usize,
    /// Required numeric field failed to parse.
    pub bad_value: usize,
    /// Later occurrence of an already-seen date.
    pub duplicate: usize,
}

impl RowDrops {
    pub fn total(&self) -> usize {
        self.undated + self.bad_value + self.duplicate
    }

    pub fn merge(&mut self, other: &RowDrops) {
        self.undated += other.undated;
        self.bad_value += other.bad_value;
        self.duplicate += other.duplicate;
    }
}

/// Outcome of the concurrent symbol-fetch batch.
///
/// Failures are data: a failed symbol appears in `errors` (rendered) and
/// is excluded from the combined price table without aborting the batch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, String)>,
    pub drops: RowDrops,
}

impl FetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Date coverage of one alignment input.
#[derive(Debug, Clone, Serialize)]
pub struct InputSpan {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: usize,
}

/// Overlap accounting for an alignment step: per-input coverage, the size
/// of the raw date intersection, and the rows that survived gap dropping.
#[derive(Debug, Clone, Serialize)]
pub struct OverlapReport {
    pub inputs: Vec<InputSpan>,
    pub common_dates: usize,
    pub aligned_rows: usize,
}

/// Event sink for pipeline progress.
pub trait PipelineObserver: Send + Sync {
    /// A symbol fetch task is being launched.
    fn on_fetch_start(&self, symbol: &str, index: usize, total: usize);

    /// A symbol fetch task finished (rows kept on success).
    fn on_fetch_complete(
        &self,
        symbol: &str,
        index: usize,
        total: usize,
        result: &Result<usize, SourceError>,
    );

    /// Every fetch task has completed.
    fn on_fetch_batch_complete(&self, succeeded: usize, failed: usize, total: usize);

    /// One external dataset was loaded and cleaned.
    fn on_dataset_loaded(&self, kind: DatasetKind, rows: usize, drops: &RowDrops);

    /// An alignment step completed.
    fn on_alignment(&self, report: &OverlapReport);
}

/// Progress reporter that prints to stdout.
pub struct StdoutObserver;

impl PipelineObserver for StdoutObserver {
    fn on_fetch_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {symbol}...", index + 1, total);
    }

    fn on_fetch_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<usize, SourceError>,
    ) {
        match result {
            Ok(rows) => println!("  OK: {symbol} ({rows} rows)"),
            Err(e) => println!("  FAIL: {symbol}: {e}"),
        }
    }

    fn on_fetch_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nFetch complete: {succeeded}/{total} succeeded, {failed} failed");
    }

    fn on_dataset_loaded(&self, kind: DatasetKind, rows: usize, drops: &RowDrops) {
        println!("Loaded {kind} data: {rows} rows ({} dropped)", drops.total());
    }

    fn on_alignment(&self, report: &OverlapReport) {
        for span in &report.inputs {
            println!(
                "  {}: {} .. {} ({} rows)",
                span.label, span.start, span.end, span.rows
            );
        }
        println!(
            "Aligned on {} common dates ({} rows after gap dropping)",
            report.common_dates, report.aligned_rows
        );
    }
}

/// Observer that discards every event (tests, embedding).
pub struct NullObserver;

impl PipelineObserver for NullObserver {
    fn on_fetch_start(&self, _symbol: &str, _index: usize, _total: usize) {}
    fn on_fetch_complete(
        &self,
        _symbol: &str,
        _index: usize,
        _total: usize,
        _result: &Result<usize, SourceError>,
    ) {
    }
    fn on_fetch_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
    fn on_dataset_loaded(&self, _kind: DatasetKind, _rows: usize, _drops: &RowDrops) {}
    fn on_alignment(&self, _report: &OverlapReport) {}
}
