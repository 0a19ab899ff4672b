//! Concurrent per-symbol fetch and price-table assembly.
//!
//! One task per symbol identifier, no shared mutable state; the combining
//! step is a join barrier that waits for every task (successful or failed)
//! before building the combined table. A single symbol's failure is
//! isolated and reported through the batch summary.

use crate::calendar;
use crate::frame::Frame;
use crate::report::{FetchSummary, PipelineObserver, RowDrops};
use crate::source::{PriceSource, RawDailyRecord, SourceError};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// One canonical trading-day record. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
    pub value: f64,
}

/// Cleaned per-symbol history: dates strictly increasing, no duplicates,
/// every close numeric.
#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub records: Vec<DailyRecord>,
}

impl SymbolSeries {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Single-column close-price frame named after the symbol.
    pub fn close_frame(&self) -> Frame {
        let points: Vec<(NaiveDate, f64)> =
            self.records.iter().map(|r| (r.date, r.close)).collect();
        Frame::from_points(&self.symbol, &points)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no price data fetched for any requested symbol")]
    NoPriceData,
}

/// Everything the fetch stage produced: the non-empty series plus the
/// batch summary (failure set and drop counts as data).
#[derive(Debug)]
pub struct FetchOutcome {
    pub series: Vec<SymbolSeries>,
    pub summary: FetchSummary,
}

/// Clean one symbol's raw records into a canonical series.
///
/// Dates are normalized through the calendar module; undated rows and rows
/// without a parseable close are dropped and counted. Records are sorted
/// ascending and de-duplicated by date keeping the first occurrence.
pub fn clean_records(symbol: &str, raw: Vec<RawDailyRecord>) -> (SymbolSeries, RowDrops) {
    let mut drops = RowDrops::default();
    let mut records: Vec<DailyRecord> = Vec::with_capacity(raw.len());

    for row in raw {
        let Some(date) = calendar::normalize(&row.date) else {
            warn!(symbol, date = ?row.date, "dropping row with unrecognized date");
            drops.undated += 1;
            continue;
        };
        let Some(close) = row.close else {
            drops.bad_value += 1;
            continue;
        };
        records.push(DailyRecord {
            date,
            close,
            volume: row.volume.unwrap_or(f64::NAN),
            value: row.value.unwrap_or(f64::NAN),
        });
    }

    records.sort_by_key(|r| r.date);
    let mut deduped: Vec<DailyRecord> = Vec::with_capacity(records.len());
    for record in records {
        if deduped.last().map(|p| p.date) == Some(record.date) {
            drops.duplicate += 1;
        } else {
            deduped.push(record);
        }
    }

    (
        SymbolSeries {
            symbol: symbol.to_string(),
            records: deduped,
        },
        drops,
    )
}

/// Fetch all symbols concurrently and clean each history.
///
/// Launches one task per symbol and collects every outcome before
/// returning. A symbol whose fetch fails (or cleans down to nothing)
/// yields an error entry in the summary and no series.
pub async fn fetch_all(
    source: Arc<dyn PriceSource>,
    symbols: &[String],
    observer: &dyn PipelineObserver,
) -> FetchOutcome {
    let total = symbols.len();
    let mut tasks: JoinSet<(usize, String, Result<Vec<RawDailyRecord>, SourceError>)> =
        JoinSet::new();

    for (index, symbol) in symbols.iter().enumerate() {
        observer.on_fetch_start(symbol, index, total);
        let source = Arc::clone(&source);
        let symbol = symbol.clone();
        tasks.spawn(async move {
            let result = source.daily_history(&symbol).await;
            (index, symbol, result)
        });
    }

    // Join barrier: every task completes before anything downstream runs.
    let mut outcomes: Vec<(usize, String, Result<Vec<RawDailyRecord>, SourceError>)> =
        Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                // A panicked task loses its symbol association; surface it
                // against the batch rather than silently shrinking it.
                warn!(error = %e, "fetch task failed to join");
                outcomes.push((
                    total,
                    "<unknown>".to_string(),
                    Err(SourceError::TaskFailed(e.to_string())),
                ));
            }
        }
    }
    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut series = Vec::new();
    let mut drops = RowDrops::default();
    let mut errors: Vec<(String, String)> = Vec::new();

    for (index, symbol, result) in outcomes {
        match result {
            Ok(raw) => {
                let (cleaned, row_drops) = clean_records(&symbol, raw);
                drops.merge(&row_drops);
                if cleaned.is_empty() {
                    let err = SourceError::EmptyHistory(symbol.clone());
                    errors.push((symbol.clone(), err.to_string()));
                    observer.on_fetch_complete(&symbol, index, total, &Err(err));
                } else {
                    info!(
                        symbol,
                        rows = cleaned.records.len(),
                        start = %cleaned.records[0].date,
                        end = %cleaned.records[cleaned.records.len() - 1].date,
                        "fetched daily history"
                    );
                    observer.on_fetch_complete(&symbol, index, total, &Ok(cleaned.records.len()));
                    series.push(cleaned);
                }
            }
            Err(e) => {
                warn!(symbol, error = %e, "symbol fetch failed");
                errors.push((symbol.clone(), e.to_string()));
                observer.on_fetch_complete(&symbol, index, total, &Err(e));
            }
        }
    }

    let succeeded = series.len();
    let failed = total - succeeded;
    observer.on_fetch_batch_complete(succeeded, failed, total);

    FetchOutcome {
        series,
        summary: FetchSummary {
            total,
            succeeded,
            failed,
            errors,
            drops,
        },
    }
}

/// Build the combined close-price table by sequentially inner-joining
/// every non-empty series on date. The final date index is the
/// intersection across all successfully fetched symbols; a symbol with a
/// narrow history shrinks the whole table.
pub fn combine_prices(series: &[SymbolSeries]) -> Result<Frame, FetchError> {
    let mut combined: Option<Frame> = None;
    for s in series {
        if s.is_empty() {
            continue;
        }
        let next = s.close_frame();
        combined = Some(match combined {
            None => next,
            Some(acc) => acc.inner_join(&next),
        });
    }
    match combined {
        Some(frame) if !frame.is_empty() => Ok(frame),
        _ => Err(FetchError::NoPriceData),
    }
}
