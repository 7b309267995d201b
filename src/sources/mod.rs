//! Market data sources
//!
//! This module provides the inputs to the metrics pipeline:
//! - CSV files: offline price and fundamentals history
//! - Yahoo Finance: daily adjusted closes and quarterly balance-sheet fields

pub mod csv_file;
#[cfg(feature = "async")]
pub mod yahoo;

pub use csv_file::CsvSource;
#[cfg(feature = "async")]
pub use yahoo::YahooFinanceSource;

use crate::error::{MetricsError, Result};
use crate::types::{FundamentalsQuarter, PriceRow, RawBundle};
use chrono::{Datelike, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How much history to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPeriod {
    Months(u32),
    Years(u32),
    YearToDate,
    Max,
}

impl HistoryPeriod {
    /// First date covered when the history ends on `end`; `None` means unbounded
    pub fn start_for(&self, end: NaiveDate) -> Option<NaiveDate> {
        match *self {
            HistoryPeriod::Months(n) => end.checked_sub_months(Months::new(n)),
            HistoryPeriod::Years(n) => end.checked_sub_months(Months::new(n * 12)),
            HistoryPeriod::YearToDate => NaiveDate::from_ymd_opt(end.year(), 1, 1),
            HistoryPeriod::Max => None,
        }
    }
}

impl Default for HistoryPeriod {
    fn default() -> Self {
        HistoryPeriod::Years(5)
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryPeriod::Months(n) => write!(f, "{}mo", n),
            HistoryPeriod::Years(n) => write!(f, "{}y", n),
            HistoryPeriod::YearToDate => f.write_str("ytd"),
            HistoryPeriod::Max => f.write_str("max"),
        }
    }
}

impl FromStr for HistoryPeriod {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1mo" => Ok(HistoryPeriod::Months(1)),
            "3mo" => Ok(HistoryPeriod::Months(3)),
            "6mo" => Ok(HistoryPeriod::Months(6)),
            "1y" => Ok(HistoryPeriod::Years(1)),
            "2y" => Ok(HistoryPeriod::Years(2)),
            "5y" => Ok(HistoryPeriod::Years(5)),
            "10y" => Ok(HistoryPeriod::Years(10)),
            "ytd" => Ok(HistoryPeriod::YearToDate),
            "max" => Ok(HistoryPeriod::Max),
            other => Err(MetricsError::ConfigError(format!(
                "unsupported history period '{}' (expected 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd or max)",
                other
            ))),
        }
    }
}

/// Fixed-delay retry settings for price retrieval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Attempt counter shared by the blocking and async fetch loops
pub(crate) struct RetryState<'a> {
    ticker: &'a str,
    source: &'a str,
    policy: &'a RetryPolicy,
    attempt: u32,
}

impl<'a> RetryState<'a> {
    pub(crate) fn new(ticker: &'a str, source: &'a str, policy: &'a RetryPolicy) -> Self {
        Self {
            ticker,
            source,
            policy,
            attempt: 0,
        }
    }

    /// Record a failed attempt; hands the error back once no attempts remain
    pub(crate) fn failed(&mut self, err: MetricsError) -> Result<Duration> {
        self.attempt += 1;
        if self.attempt >= self.policy.attempts {
            return Err(err);
        }
        log::warn!(
            "{}: price fetch from {} failed (attempt {}/{}): {}",
            self.ticker,
            self.source,
            self.attempt,
            self.policy.attempts,
            err
        );
        Ok(self.policy.delay)
    }

    /// Attempts made so far
    pub(crate) fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// A provider of daily prices and quarterly fundamentals for one ticker
pub trait MarketDataProvider {
    /// Daily closes covering `period`; an empty vector means no data
    fn fetch_prices(&self, ticker: &str, period: HistoryPeriod) -> Result<Vec<PriceRow>>;

    /// Quarterly balance-sheet data; an empty vector means none reported
    fn fetch_fundamentals(&self, ticker: &str) -> Result<Vec<FundamentalsQuarter>>;

    /// Get the source name
    fn name(&self) -> &str;
}

/// Fetch prices (with retries) and fundamentals, and build a validated bundle.
///
/// Fails with `EmptyPriceHistory` when the provider has no prices. Fundamentals
/// are best effort: a failure there is logged and treated as none reported.
pub fn fetch_raw_bundle<P: MarketDataProvider + ?Sized>(
    provider: &P,
    ticker: &str,
    period: HistoryPeriod,
    retry: &RetryPolicy,
) -> Result<RawBundle> {
    let mut state = RetryState::new(ticker, provider.name(), retry);
    let prices = loop {
        match provider.fetch_prices(ticker, period) {
            Ok(prices) => break prices,
            Err(e) => std::thread::sleep(state.failed(e)?),
        }
    };
    if state.attempts() > 0 {
        log::info!("{}: prices fetched after {} failed attempts", ticker, state.attempts());
    }

    let fundamentals = provider.fetch_fundamentals(ticker).unwrap_or_else(|e| {
        log::warn!("{}: no fundamentals from {}: {}", ticker, provider.name(), e);
        Vec::new()
    });

    assemble_bundle(ticker, prices, fundamentals)
}

/// Turn fetched rows into a bundle, rejecting an empty price history
pub(crate) fn assemble_bundle(
    ticker: &str,
    prices: Vec<PriceRow>,
    fundamentals: Vec<FundamentalsQuarter>,
) -> Result<RawBundle> {
    if prices.is_empty() {
        return Err(MetricsError::EmptyPriceHistory {
            ticker: ticker.to_string(),
        });
    }
    log::info!(
        "{}: fetched {} price rows and {} fundamentals quarters",
        ticker,
        prices.len(),
        fundamentals.len()
    );
    RawBundle::from_rows(ticker, prices, fundamentals)
}

/// Keep only rows on or after the period's start, measured back from the latest row
pub(crate) fn trim_to_period(mut prices: Vec<PriceRow>, period: HistoryPeriod) -> Vec<PriceRow> {
    let latest = match prices.iter().map(|p| p.date).max() {
        Some(latest) => latest,
        None => return prices,
    };
    if let Some(start) = period.start_for(latest) {
        prices.retain(|p| p.date >= start);
    }
    prices
}
