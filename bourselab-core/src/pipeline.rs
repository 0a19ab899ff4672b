//! End-to-end pipeline orchestration.
//!
//! fetch (concurrent, ×N symbols) → combined price table → external
//! dataset loads (×4) → feature/target build → chronological split.
//!
//! Per-item failures stay inside stage summaries; everything surfaced as
//! a [`PipelineError`] is fatal for the run. Callers terminate with a
//! failure status and write no partial outputs.

use crate::features::{self, BuildError, Split};
use crate::fetch::{self, FetchError};
use crate::frame::Frame;
use crate::loader::{self, DatasetKind, LoadError};
use crate::report::{FetchSummary, OverlapReport, PipelineObserver, RowDrops};
use crate::source::PriceSource;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Inputs for one pipeline run. Deserializable from a TOML run config.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Symbol identifiers to fetch from the price source.
    pub symbols: Vec<String>,
    /// Market index file (must carry a daily return column).
    pub market_index: PathBuf,
    /// Risk-free rate file.
    pub risk_free_rate: PathBuf,
    /// Market capitalization file.
    pub market_cap: PathBuf,
    /// USD exchange rate file.
    pub usd_to_rial: PathBuf,
}

impl PipelineConfig {
    pub fn path_for(&self, kind: DatasetKind) -> &Path {
        match kind {
            DatasetKind::MarketIndex => &self.market_index,
            DatasetKind::RiskFreeRate => &self.risk_free_rate,
            DatasetKind::MarketCap => &self.market_cap,
            DatasetKind::UsdToRial => &self.usd_to_rial,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to load {kind} data: {source}")]
    DatasetLoad {
        kind: DatasetKind,
        source: LoadError,
    },

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Everything a successful run produces.
#[derive(Debug)]
pub struct PipelineOutput {
    pub split: Split,
    pub fetch: FetchSummary,
    pub dataset_drops: Vec<(DatasetKind, RowDrops)>,
    pub overlap: OverlapReport,
    /// BLAKE3 fingerprint of the final feature/target data.
    pub dataset_hash: String,
}

/// Flat, serializable digest of a run for logs and JSON output.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub symbols_requested: usize,
    pub symbols_fetched: usize,
    pub fetch_errors: Vec<(String, String)>,
    pub fetch_drops: RowDrops,
    pub dataset_drops: BTreeMap<String, RowDrops>,
    pub common_dates: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_start: Option<NaiveDate>,
    pub train_end: Option<NaiveDate>,
    pub test_start: Option<NaiveDate>,
    pub test_end: Option<NaiveDate>,
    pub dataset_hash: String,
}

impl PipelineOutput {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            symbols_requested: self.fetch.total,
            symbols_fetched: self.fetch.succeeded,
            fetch_errors: self.fetch.errors.clone(),
            fetch_drops: self.fetch.drops,
            dataset_drops: self
                .dataset_drops
                .iter()
                .map(|(kind, drops)| (kind.to_string(), *drops))
                .collect(),
            common_dates: self.overlap.common_dates,
            train_rows: self.split.x_train.len(),
            test_rows: self.split.x_test.len(),
            train_start: self.split.x_train.first_date(),
            train_end: self.split.x_train.last_date(),
            test_start: self.split.x_test.first_date(),
            test_end: self.split.x_test.last_date(),
            dataset_hash: self.dataset_hash.clone(),
        }
    }
}

/// Run the whole pipeline.
pub async fn run(
    source: Arc<dyn PriceSource>,
    config: &PipelineConfig,
    observer: &dyn PipelineObserver,
) -> Result<PipelineOutput, PipelineError> {
    info!(
        source = source.name(),
        symbols = config.symbols.len(),
        "starting pipeline run"
    );

    let outcome = fetch::fetch_all(Arc::clone(&source), &config.symbols, observer).await;
    let prices = fetch::combine_prices(&outcome.series).map_err(|e| {
        error!("no usable price data after symbol aggregation");
        e
    })?;
    info!(
        rows = prices.len(),
        symbols = prices.columns().len(),
        "combined price table built"
    );

    let mut dataset_drops = Vec::with_capacity(4);
    let mut load_kind = |kind: DatasetKind| -> Result<Frame, PipelineError> {
        let series = loader::load(config.path_for(kind), kind)
            .map_err(|e| PipelineError::DatasetLoad { kind, source: e })?;
        observer.on_dataset_loaded(kind, series.frame.len(), &series.drops);
        dataset_drops.push((kind, series.drops));
        Ok(series.frame)
    };
    let market = load_kind(DatasetKind::MarketIndex)?;
    let risk_free = load_kind(DatasetKind::RiskFreeRate)?;
    let market_cap = load_kind(DatasetKind::MarketCap)?;
    let usd_to_rial = load_kind(DatasetKind::UsdToRial)?;

    let built = features::build(&prices, &market, &risk_free, &market_cap, &usd_to_rial)?;
    observer.on_alignment(&built.overlap);

    let dataset_hash = split_hash(&built.split);
    info!(dataset_hash = %dataset_hash, "pipeline run complete");

    Ok(PipelineOutput {
        split: built.split,
        fetch: outcome.summary,
        dataset_drops,
        overlap: built.overlap,
        dataset_hash,
    })
}

/// Deterministic BLAKE3 fingerprint over the split's dates and cells.
fn split_hash(split: &Split) -> String {
    let mut hasher = blake3::Hasher::new();
    for frame in [
        &split.x_train,
        &split.x_test,
        &split.y_train,
        &split.y_test,
    ] {
        for date in frame.dates() {
            hasher.update(date.to_string().as_bytes());
        }
        for column in frame.columns() {
            hasher.update(column.name.as_bytes());
            for value in &column.values {
                hasher.update(&value.unwrap_or(f64::NAN).to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}
