//! Price-source trait and structured error types.
//!
//! The [`PriceSource`] trait abstracts over the remote daily-history
//! endpoint so the fetch layer can be exercised against a mock in tests.
//! The source is best-effort and unreliable per item: a failure for one
//! symbol is data for the batch summary, never an abort.

use crate::calendar::RawDate;
use async_trait::async_trait;
use thiserror::Error;

/// One daily record as delivered by the source, before any cleaning.
///
/// Numeric fields are lenient: values the wire could not represent as a
/// number arrive as `None` and are dropped (and counted) by the fetch
/// layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDailyRecord {
    pub date: RawDate,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub value: Option<f64>,
}

/// Structured errors from a price source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from price source for symbol '{symbol}'")]
    Status { symbol: String, status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("empty daily history for symbol '{0}'")]
    EmptyHistory(String),

    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

/// A remote source of full per-symbol daily history.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the complete daily history for one symbol identifier.
    async fn daily_history(&self, symbol_id: &str) -> Result<Vec<RawDailyRecord>, SourceError>;
}
