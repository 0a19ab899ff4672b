//! bourselab CLI — run the ingestion-and-alignment pipeline.
//!
//! Commands:
//! - `run` — fetch symbol prices, load the four external datasets, align,
//!   derive features, and print the resulting split summary

use anyhow::{bail, Context, Result};
use bourselab_core::pipeline::{self, PipelineConfig, RunSummary};
use bourselab_core::report::StdoutObserver;
use bourselab_core::tsetmc::TsetmcSource;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bourselab",
    about = "bourselab CLI — market data ingestion and alignment pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, load, align, and split; print a run summary.
    Run {
        /// Path to a TOML run config (symbols + dataset paths).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Symbol identifiers to fetch (alternative to --config).
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Market index file (.csv/.xlsx/.xls).
        #[arg(long)]
        market: Option<PathBuf>,

        /// Risk-free rate file.
        #[arg(long)]
        risk_free: Option<PathBuf>,

        /// Market capitalization file.
        #[arg(long)]
        market_cap: Option<PathBuf>,

        /// USD exchange rate file.
        #[arg(long)]
        fx: Option<PathBuf>,

        /// Base URL of the price endpoint. Defaults to the public CDN.
        #[arg(long)]
        base_url: Option<String>,

        /// Write the run summary as JSON to this path.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            symbols,
            market,
            risk_free,
            market_cap,
            fx,
            base_url,
            summary_json,
        } => {
            let config = build_config(config, symbols, market, risk_free, market_cap, fx)?;
            run_pipeline(config, base_url, summary_json).await
        }
    }
}

fn build_config(
    config_path: Option<PathBuf>,
    symbols: Vec<String>,
    market: Option<PathBuf>,
    risk_free: Option<PathBuf>,
    market_cap: Option<PathBuf>,
    fx: Option<PathBuf>,
) -> Result<PipelineConfig> {
    if let Some(path) = config_path {
        if !symbols.is_empty()
            || market.is_some()
            || risk_free.is_some()
            || market_cap.is_some()
            || fx.is_some()
        {
            bail!("--config and explicit input flags are mutually exclusive");
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: PipelineConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        if config.symbols.is_empty() {
            bail!("config lists no symbols");
        }
        return Ok(config);
    }

    if symbols.is_empty() {
        bail!("one of --config or --symbols is required");
    }
    let (Some(market_index), Some(risk_free_rate), Some(market_cap), Some(usd_to_rial)) =
        (market, risk_free, market_cap, fx)
    else {
        bail!("--market, --risk-free, --market-cap, and --fx are all required without --config");
    };

    Ok(PipelineConfig {
        symbols,
        market_index,
        risk_free_rate,
        market_cap,
        usd_to_rial,
    })
}

async fn run_pipeline(
    config: PipelineConfig,
    base_url: Option<String>,
    summary_json: Option<PathBuf>,
) -> Result<()> {
    let source = match base_url {
        Some(url) => TsetmcSource::with_base_url(&url),
        None => TsetmcSource::new(),
    };

    let output = pipeline::run(Arc::new(source), &config, &StdoutObserver).await?;

    let summary = output.summary();
    print_summary(&summary);

    if let Some(path) = summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing summary {}", path.display()))?;
        println!("Summary saved to: {}", path.display());
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== Pipeline Result ===");
    println!(
        "Symbols:        {}/{} fetched",
        summary.symbols_fetched, summary.symbols_requested
    );
    for (symbol, err) in &summary.fetch_errors {
        println!("  failed: {symbol}: {err}");
    }
    println!(
        "Rows dropped:   {} fetch ({} undated, {} bad values, {} duplicates)",
        summary.fetch_drops.total(),
        summary.fetch_drops.undated,
        summary.fetch_drops.bad_value,
        summary.fetch_drops.duplicate
    );
    for (label, drops) in &summary.dataset_drops {
        println!("  {label}: {} dropped", drops.total());
    }
    println!("Common dates:   {}", summary.common_dates);
    match (summary.train_start, summary.train_end) {
        (Some(start), Some(end)) => {
            println!("Train:          {} rows ({start} to {end})", summary.train_rows)
        }
        _ => println!("Train:          {} rows", summary.train_rows),
    }
    match (summary.test_start, summary.test_end) {
        (Some(start), Some(end)) => {
            println!("Test:           {} rows ({start} to {end})", summary.test_rows)
        }
        _ => println!("Test:           {} rows", summary.test_rows),
    }
    println!("Dataset hash:   {}", summary.dataset_hash);
    println!();
}
