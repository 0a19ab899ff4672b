//! bourselab core — ingestion-and-alignment pipeline for portfolio data prep.
//!
//! The pipeline turns unreliable, heterogeneous inputs into a clean
//! feature/target split for a downstream portfolio optimizer:
//! - Concurrent per-symbol fetch from the exchange's price endpoint, with
//!   calendar normalization (Jalali → Gregorian) and per-row sanitation
//! - Fuzzy schema resolution for user-supplied spreadsheets/CSV files of
//!   unknown, multilingual column naming
//! - Date-intersection alignment across all series, with gap rows dropped
//! - Return/factor derivation and a deterministic chronological
//!   train/test split
//!
//! Nothing persists across runs; each stage owns and replaces its output.

pub mod align;
pub mod calendar;
pub mod features;
pub mod fetch;
pub mod frame;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod source;
pub mod tsetmc;

pub use align::{align, AlignError};
pub use calendar::RawDate;
pub use features::Split;
pub use fetch::{DailyRecord, SymbolSeries};
pub use frame::{Column, Frame};
pub use loader::DatasetKind;
pub use pipeline::{PipelineConfig, PipelineError, PipelineOutput, RunSummary};
pub use report::{FetchSummary, NullObserver, PipelineObserver, RowDrops, StdoutObserver};
pub use source::{PriceSource, RawDailyRecord, SourceError};
pub use tsetmc::TsetmcSource;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across the fetch task boundary
    /// are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<RawDailyRecord>();
        require_sync::<RawDailyRecord>();
        require_send::<SymbolSeries>();
        require_sync::<SymbolSeries>();
        require_send::<Frame>();
        require_sync::<Frame>();
        require_send::<Split>();
        require_sync::<Split>();
        require_send::<SourceError>();
        require_sync::<SourceError>();
    }
}
