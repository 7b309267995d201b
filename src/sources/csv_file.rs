//! CSV file data source
//!
//! Prices: `date,close` with optional `open,high,low,volume` columns.
//! Fundamentals: `period_end` with optional `total_debt,cash,shares_out,book_value,revenue,ebitda`.
//! Rows that fail to parse or validate are dropped with a warning.

use super::{trim_to_period, HistoryPeriod, MarketDataProvider};
use crate::error::{MetricsError, Result};
use crate::types::{FundamentalsQuarter, PriceRow, DATE_FORMAT};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct PriceRecord {
    date: String,
    close: Option<f64>,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FundamentalsRecord {
    period_end: String,
    #[serde(default)]
    total_debt: Option<Decimal>,
    #[serde(default)]
    cash: Option<Decimal>,
    #[serde(default)]
    shares_out: Option<Decimal>,
    #[serde(default)]
    book_value: Option<Decimal>,
    #[serde(default)]
    revenue: Option<Decimal>,
    #[serde(default)]
    ebitda: Option<Decimal>,
}

/// Reads one ticker's history from local CSV files
#[derive(Debug, Clone)]
pub struct CsvSource {
    prices_path: PathBuf,
    fundamentals_path: Option<PathBuf>,
}

impl CsvSource {
    pub fn new(prices_path: impl Into<PathBuf>) -> Self {
        Self {
            prices_path: prices_path.into(),
            fundamentals_path: None,
        }
    }

    pub fn with_fundamentals(mut self, path: impl Into<PathBuf>) -> Self {
        self.fundamentals_path = Some(path.into());
        self
    }

    fn open(path: &Path) -> Result<std::fs::File> {
        std::fs::File::open(path).map_err(|e| {
            MetricsError::DataError(format!("Failed to open {}: {}", path.display(), e))
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    // Accept a bare date or a timestamp whose first 10 characters are the date
    let head = s.trim().get(..10).unwrap_or(s.trim());
    NaiveDate::parse_from_str(head, DATE_FORMAT)
        .map_err(|e| MetricsError::ParseError(format!("bad date '{}': {}", s, e)))
}

/// Parse price rows, skipping any with an unparseable date, a missing close or a failed check
pub fn parse_prices<R: Read>(reader: R) -> Result<Vec<PriceRow>> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();

    for (line, result) in reader.deserialize::<PriceRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("price row {}: CSV parse error: {}", line + 1, e);
                continue;
            }
        };

        let row = parse_date(&record.date).and_then(|date| {
            let close = record.close.ok_or_else(|| {
                MetricsError::InvalidPriceRow(format!("{}: missing close", date))
            })?;
            PriceRow::with_ohlcv(
                date,
                record.open,
                record.high,
                record.low,
                close,
                record.volume.filter(|v| *v >= 0.0).map(|v| v as u64),
            )
        });

        match row {
            Ok(row) => rows.push(row),
            Err(e) => log::warn!("price row {}: {}", line + 1, e),
        }
    }

    Ok(rows)
}

/// Parse fundamentals quarters, skipping any with an unparseable period or a failed check
pub fn parse_fundamentals<R: Read>(reader: R) -> Result<Vec<FundamentalsQuarter>> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut quarters = Vec::new();

    for (line, result) in reader.deserialize::<FundamentalsRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("fundamentals row {}: CSV parse error: {}", line + 1, e);
                continue;
            }
        };

        let quarter = FundamentalsQuarter::parse_period_end(&record.period_end).and_then(|period_end| {
            let q = FundamentalsQuarter {
                period_end,
                total_debt: record.total_debt,
                cash: record.cash,
                shares_out: record.shares_out,
                book_value: record.book_value,
                revenue: record.revenue,
                ebitda: record.ebitda,
            };
            q.validate()?;
            Ok(q)
        });

        match quarter {
            Ok(q) => quarters.push(q),
            Err(e) => log::warn!("fundamentals row {}: {}", line + 1, e),
        }
    }

    Ok(quarters)
}

impl MarketDataProvider for CsvSource {
    fn fetch_prices(&self, _ticker: &str, period: HistoryPeriod) -> Result<Vec<PriceRow>> {
        let prices = parse_prices(Self::open(&self.prices_path)?)?;
        Ok(trim_to_period(prices, period))
    }

    fn fetch_fundamentals(&self, _ticker: &str) -> Result<Vec<FundamentalsQuarter>> {
        match &self.fundamentals_path {
            Some(path) => parse_fundamentals(Self::open(path)?),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &str {
        "csv"
    }
}
