//! Tehran exchange (TSETMC) price source.
//!
//! Fetches the full closing-price daily list for an instrument code from
//! the exchange's public CDN endpoint and maps rows onto
//! [`RawDailyRecord`]. The endpoint is unofficial and best-effort; rows
//! carry dates as `yyyymmdd` integers in either the Jalali or the
//! Gregorian calendar depending on the row's era, so the date is handed
//! downstream as a [`RawDate`] and resolved by the calendar normalizer.
//!
//! Deliberately no retry and no request timeout here: a failed fetch is
//! terminal for that symbol in that run.

use crate::calendar::RawDate;
use crate::source::{PriceSource, RawDailyRecord, SourceError};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://cdn.tsetmc.com";

#[derive(Debug, Deserialize)]
struct ClosingPriceResponse {
    #[serde(rename = "closingPriceDaily", default)]
    closing_price_daily: Vec<ClosingPriceRow>,
}

#[derive(Debug, Deserialize)]
struct ClosingPriceRow {
    /// Trading day as a yyyymmdd integer (calendar varies by era).
    #[serde(rename = "dEven", default)]
    d_even: Option<i64>,
    /// Closing price.
    #[serde(rename = "pClosing", default, deserialize_with = "lenient_f64")]
    p_closing: Option<f64>,
    /// Traded share volume.
    #[serde(rename = "qTotTran5J", default, deserialize_with = "lenient_f64")]
    q_tot_tran: Option<f64>,
    /// Traded value.
    #[serde(rename = "qTotCap", default, deserialize_with = "lenient_f64")]
    q_tot_cap: Option<f64>,
}

/// Accept a JSON number or a numeric string; anything else becomes `None`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }))
}

/// Classify a `yyyymmdd` integer into the calendar it belongs to.
///
/// Jalali years in circulation are 1200–1500; Gregorian trading history
/// starts well after 1900. Anything else is undated and will be dropped
/// (and counted) downstream.
fn raw_date_from_yyyymmdd(n: i64) -> RawDate {
    let year = (n / 10_000) as i32;
    let month = ((n / 100) % 100) as u32;
    let day = (n % 100) as u32;
    match year {
        1200..=1500 => RawDate::Jalali { year, month, day },
        1900..=2200 => match chrono::NaiveDate::from_ymd_opt(year, month, day) {
            Some(d) => match d.and_hms_opt(0, 0, 0) {
                Some(dt) => RawDate::Gregorian(dt),
                None => RawDate::Undated,
            },
            None => RawDate::Undated,
        },
        _ => RawDate::Undated,
    }
}

/// TSETMC closing-price source.
pub struct TsetmcSource {
    client: reqwest::Client,
    base_url: String,
}

impl TsetmcSource {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the source at a different host (used by tests).
    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn history_url(&self, symbol_id: &str) -> String {
        format!(
            "{}/api/ClosingPrice/GetClosingPriceDailyList/{symbol_id}/0",
            self.base_url
        )
    }

    fn convert_rows(rows: Vec<ClosingPriceRow>) -> Vec<RawDailyRecord> {
        rows.into_iter()
            .map(|row| RawDailyRecord {
                date: row.d_even.map_or(RawDate::Undated, raw_date_from_yyyymmdd),
                close: row.p_closing,
                volume: row.q_tot_tran,
                value: row.q_tot_cap,
            })
            .collect()
    }
}

impl Default for TsetmcSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for TsetmcSource {
    fn name(&self) -> &str {
        "tsetmc"
    }

    async fn daily_history(&self, symbol_id: &str) -> Result<Vec<RawDailyRecord>, SourceError> {
        let url = self.history_url(symbol_id);
        debug!(symbol_id, %url, "requesting daily history");

        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                symbol: symbol_id.to_string(),
                status: status.as_u16(),
            });
        }

        let parsed: ClosingPriceResponse = resp.json().await.map_err(|e| {
            SourceError::ResponseFormat(format!("failed to parse response for {symbol_id}: {e}"))
        })?;

        if parsed.closing_price_daily.is_empty() {
            return Err(SourceError::EmptyHistory(symbol_id.to_string()));
        }

        Ok(Self::convert_rows(parsed.closing_price_daily))
    }
}
