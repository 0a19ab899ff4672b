//! External dataset loading: spreadsheets and CSV files of unknown schema.
//!
//! Four datasets are mandatory inputs to the pipeline — market index
//! return, risk-free rate, market capitalization, and the USD exchange
//! rate. Each arrives as a user-supplied `.csv`/`.xlsx`/`.xls` file with
//! arbitrary column order and naming (English or Persian). The two
//! required fields per dataset (`date` plus one value field) are located
//! by fuzzy resolution against per-kind alias tables, then standardized.
//!
//! This path assumes Gregorian-format dates (unlike the fetch path, which
//! goes through the calendar normalizer).

use crate::frame::Frame;
use crate::report::RowDrops;
use crate::schema::{self, MATCH_THRESHOLD};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// The four external dataset kinds the pipeline requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DatasetKind {
    MarketIndex,
    RiskFreeRate,
    MarketCap,
    UsdToRial,
}

/// Recognized spellings of the date column, shared across all kinds.
pub const DATE_ALIASES: &[&str] = &["date", "Date", "Gregorian Date", "تاریخ میلادی"];

impl DatasetKind {
    pub fn all() -> [DatasetKind; 4] {
        [
            DatasetKind::MarketIndex,
            DatasetKind::RiskFreeRate,
            DatasetKind::MarketCap,
            DatasetKind::UsdToRial,
        ]
    }

    /// Canonical name the value column is renamed to.
    pub fn value_field(&self) -> &'static str {
        match self {
            DatasetKind::MarketIndex => "daily_return",
            DatasetKind::RiskFreeRate => "risk_free_rate",
            DatasetKind::MarketCap => "market_cap",
            DatasetKind::UsdToRial => "usd_to_rial",
        }
    }

    /// Recognized spellings of the value column for this kind.
    pub fn value_aliases(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::MarketIndex => &["return", "daily return", "بازده", "بازده روزانه"],
            DatasetKind::RiskFreeRate => &[
                "ytm",
                "YTM",
                "Yield to Maturity",
                "Interest Rate",
                "Risk-Free Rate",
            ],
            DatasetKind::MarketCap => &[
                "market_cap",
                "Market Cap",
                "Market Capitalization",
                "بازار سرمایه",
                "price",
            ],
            DatasetKind::UsdToRial => &[
                "usd_to_rial",
                "USD to Rial",
                "Exchange Rate",
                "نرخ تبدیل دلار به ریال",
                "price",
            ],
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DatasetKind::MarketIndex => "market index",
            DatasetKind::RiskFreeRate => "risk-free rate",
            DatasetKind::MarketCap => "market cap",
            DatasetKind::UsdToRial => "USD exchange rate",
        };
        f.write_str(label)
    }
}

/// One cell of a raw parsed table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

/// A table as parsed from disk, before schema resolution.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read table: {0}")]
    Read(String),

    #[error("required column for '{field}' not found")]
    ColumnNotResolved { field: String },

    #[error("no valid rows after parsing")]
    Empty,
}

/// A standardized external series: a single value column (named by the
/// kind) on a sorted, de-duplicated date axis, plus drop accounting.
#[derive(Debug)]
pub struct LoadedSeries {
    pub kind: DatasetKind,
    pub frame: Frame,
    pub drops: RowDrops,
}

/// Read a tabular file into a raw table, dispatching on extension.
pub fn read_table(path: &Path) -> Result<RawTable, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" => read_spreadsheet(path),
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

fn read_csv(path: &Path) -> Result<RawTable, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| LoadError::Read(e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| LoadError::Read(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| LoadError::Read(e.to_string()))?;
        let mut row: Vec<Cell> = Vec::with_capacity(headers.len());
        for i in 0..headers.len() {
            row.push(match record.get(i) {
                Some(s) if !s.trim().is_empty() => Cell::Text(s.to_string()),
                _ => Cell::Empty,
            });
        }
        rows.push(row);
    }
    Ok(RawTable { headers, rows })
}

fn read_spreadsheet(path: &Path) -> Result<RawTable, LoadError> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook = open_workbook_auto(path).map_err(|e| LoadError::Read(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::Read("workbook has no sheets".to_string()))?
        .map_err(|e| LoadError::Read(e.to_string()))?;

    let mut iter = range.rows();
    let headers: Vec<String> = match iter.next() {
        Some(row) => row.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Err(LoadError::Empty),
    };

    let convert = |c: &Data| -> Cell {
        match c {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Data::DateTime(dt) => dt.as_datetime().map(Cell::Date).unwrap_or(Cell::Empty),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    };

    let rows: Vec<Vec<Cell>> = iter
        .map(|row| {
            let mut cells: Vec<Cell> = row.iter().map(convert).collect();
            cells.resize(headers.len(), Cell::Empty);
            cells
        })
        .collect();

    Ok(RawTable { headers, rows })
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return yyyymmdd_to_date(s.parse().ok()?);
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

fn yyyymmdd_to_date(n: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt((n / 10_000) as i32, ((n / 100) % 100) as u32, (n % 100) as u32)
}

/// Generic (calendar-unaware) date parsing for a cell, truncated to day.
fn parse_date_cell(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(dt) => Some(dt.date()),
        Cell::Text(s) => parse_date_str(s),
        Cell::Number(f) if f.fract() == 0.0 => yyyymmdd_to_date(*f as i64),
        _ => None,
    }
}

/// Numeric coercion for a cell. Text values may carry thousands
/// separators.
fn parse_value_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(f) if f.is_finite() => Some(*f),
        Cell::Text(s) => {
            let cleaned = s.trim().replace(',', "");
            cleaned.parse().ok().filter(|v: &f64| v.is_finite())
        }
        _ => None,
    }
}

/// Load one external dataset: read, resolve schema, standardize, clean.
///
/// Unresolvable required columns and empty results are errors — all four
/// kinds are mandatory, so the caller treats them as fatal for the run.
pub fn load(path: &Path, kind: DatasetKind) -> Result<LoadedSeries, LoadError> {
    let table = read_table(path)?;
    load_table(&table, kind)
}

/// Schema resolution and cleaning on an already-parsed table (the unit
/// tests drive this directly with synthetic tables).
pub fn load_table(table: &RawTable, kind: DatasetKind) -> Result<LoadedSeries, LoadError> {
    let observed = schema::observed_labels(&table.headers);

    let date_match = schema::resolve_field("date", &observed, DATE_ALIASES, MATCH_THRESHOLD)
        .ok_or_else(|| LoadError::ColumnNotResolved {
            field: "date".to_string(),
        })?;
    let value_match = schema::resolve_field(
        kind.value_field(),
        &observed,
        kind.value_aliases(),
        MATCH_THRESHOLD,
    )
    .ok_or_else(|| LoadError::ColumnNotResolved {
        field: kind.value_field().to_string(),
    })?;

    info!(
        kind = %kind,
        date_column = %date_match.column,
        date_score = date_match.score,
        value_column = %value_match.column,
        value_score = value_match.score,
        "resolved dataset schema"
    );

    let date_idx = table
        .headers
        .iter()
        .position(|h| *h == date_match.column)
        .ok_or_else(|| LoadError::ColumnNotResolved {
            field: "date".to_string(),
        })?;
    let value_idx = table
        .headers
        .iter()
        .position(|h| *h == value_match.column)
        .ok_or_else(|| LoadError::ColumnNotResolved {
            field: kind.value_field().to_string(),
        })?;

    let mut drops = RowDrops::default();
    let mut points: Vec<(NaiveDate, f64)> = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let Some(date) = row.get(date_idx).and_then(parse_date_cell) else {
            drops.undated += 1;
            continue;
        };
        let Some(value) = row.get(value_idx).and_then(parse_value_cell) else {
            drops.bad_value += 1;
            continue;
        };
        points.push((date, value));
    }

    points.sort_by_key(|(d, _)| *d);
    let mut deduped: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
    for (date, value) in points {
        if deduped.last().map(|(d, _)| *d) == Some(date) {
            drops.duplicate += 1;
        } else {
            deduped.push((date, value));
        }
    }

    if deduped.is_empty() {
        return Err(LoadError::Empty);
    }

    info!(
        kind = %kind,
        rows = deduped.len(),
        start = %deduped[0].0,
        end = %deduped[deduped.len() - 1].0,
        dropped = drops.total(),
        "loaded external dataset"
    );

    Ok(LoadedSeries {
        kind,
        frame: Frame::from_points(kind.value_field(), &deduped),
        drops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            })
            .collect()
    }

    fn table(headers: &[&str], rows: &[Vec<Cell>]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows.to_vec(),
        }
    }

    #[test]
    fn loads_market_cap_with_full_header_name() {
        let t = table(
            &["Gregorian Date", "Market Capitalization"],
            &[
                text_row(&["2020-01-02", "1200.5"]),
                text_row(&["2020-01-01", "1,100"]),
            ],
        );
        let loaded = load_table(&t, DatasetKind::MarketCap).unwrap();
        assert_eq!(loaded.frame.column_names(), vec!["market_cap"]);
        assert_eq!(loaded.frame.len(), 2);
        // Sorted ascending; thousands separator handled.
        assert_eq!(
            loaded.frame.column("market_cap").unwrap().values[0],
            Some(1100.0)
        );
    }

    #[test]
    fn drops_unparseable_rows_and_counts_them() {
        let t = table(
            &["date", "YTM"],
            &[
                text_row(&["2020-01-01", "0.18"]),
                text_row(&["not a date", "0.19"]),
                text_row(&["2020-01-02", "n/a"]),
                text_row(&["2020-01-02", "0.20"]),
                text_row(&["2020-01-02", "0.21"]),
            ],
        );
        let loaded = load_table(&t, DatasetKind::RiskFreeRate).unwrap();
        assert_eq!(loaded.frame.len(), 2);
        assert_eq!(loaded.drops.undated, 1);
        assert_eq!(loaded.drops.bad_value, 1);
        assert_eq!(loaded.drops.duplicate, 1);
        // Keep-first on duplicate dates after sorting.
        assert_eq!(
            loaded.frame.column("risk_free_rate").unwrap().values[1],
            Some(0.20)
        );
    }

    #[test]
    fn unresolved_column_fails_the_dataset() {
        let t = table(
            &["date", "Some Unrelated Thing"],
            &[text_row(&["2020-01-01", "1.0"])],
        );
        let err = load_table(&t, DatasetKind::MarketIndex).unwrap_err();
        assert!(matches!(err, LoadError::ColumnNotResolved { .. }));
    }

    #[test]
    fn all_rows_invalid_is_empty() {
        let t = table(
            &["date", "return"],
            &[text_row(&["", ""]), text_row(&["??", "1.0"])],
        );
        let err = load_table(&t, DatasetKind::MarketIndex).unwrap_err();
        assert!(matches!(err, LoadError::Empty));
    }

    #[test]
    fn persian_headers_resolve() {
        let t = table(
            &["تاریخ میلادی", "بازده روزانه"],
            &[text_row(&["2020-01-01", "0.004"])],
        );
        let loaded = load_table(&t, DatasetKind::MarketIndex).unwrap();
        assert_eq!(loaded.frame.column_names(), vec!["daily_return"]);
    }

    #[test]
    fn yyyymmdd_and_slash_dates_parse() {
        assert_eq!(
            parse_date_str("20200131"),
            NaiveDate::from_ymd_opt(2020, 1, 31)
        );
        assert_eq!(
            parse_date_str("2020/01/31"),
            NaiveDate::from_ymd_opt(2020, 1, 31)
        );
        assert_eq!(
            parse_date_str("01/31/2020"),
            NaiveDate::from_ymd_opt(2020, 1, 31)
        );
        assert_eq!(parse_date_str("31st of Jan"), None);
    }

    #[test]
    fn csv_files_round_trip_through_read_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "Date,Interest Rate").unwrap();
        writeln!(f, "2020-01-01,0.18").unwrap();
        writeln!(f, "2020-01-02,0.19").unwrap();
        drop(f);

        let loaded = load(&path, DatasetKind::RiskFreeRate).unwrap();
        assert_eq!(loaded.frame.len(), 2);
        assert_eq!(loaded.drops.total(), 0);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_table(Path::new("data.parquet")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }
}
