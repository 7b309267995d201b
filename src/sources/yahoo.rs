//! Yahoo Finance data source integration
//!
//! Daily adjusted closes come from the v8 chart endpoint; balance-sheet fields
//! come from the fundamentals time-series endpoint, quarterly first and annual
//! when no quarterly data is reported. Responses are parsed by pure functions
//! so they can be tested offline.

use super::{assemble_bundle, trim_to_period, HistoryPeriod, RetryPolicy, RetryState};
use crate::error::{MetricsError, Result};
use crate::types::{FundamentalsQuarter, PriceRow, RawBundle, DATE_FORMAT};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const QUOTE_URL: &str = "https://query2.finance.yahoo.com/v7/finance/quote";
const TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";

const DEBT_FIELD: &str = "TotalDebt";
const CASH_FIELD: &str = "CashAndCashEquivalents";
const EQUITY_FIELD: &str = "StockholdersEquity";
const SHARES_FIELD: &str = "OrdinarySharesNumber";

/// Reporting frequency of a balance-sheet series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFrequency {
    Quarterly,
    Annual,
}

impl ReportFrequency {
    fn prefix(self) -> &'static str {
        match self {
            ReportFrequency::Quarterly => "quarterly",
            ReportFrequency::Annual => "annual",
        }
    }

    /// Comma-separated series names for the time-series `type` parameter
    pub fn series_types(self) -> String {
        [DEBT_FIELD, CASH_FIELD, EQUITY_FIELD, SHARES_FIELD]
            .iter()
            .map(|field| format!("{}{}", self.prefix(), field))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Yahoo Finance data source (no API key required)
pub struct YahooFinanceSource {
    client: Client,
}

impl YahooFinanceSource {
    /// Create a new Yahoo Finance data source
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| MetricsError::DataError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn name(&self) -> &str {
        "yahoo"
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MetricsError::DataError(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MetricsError::DataError(format!(
                "Yahoo Finance returned error: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MetricsError::DataError(format!("Failed to read response: {}", e)))
    }

    /// Fetch daily adjusted closes covering `period`
    pub async fn fetch_prices(&self, ticker: &str, period: HistoryPeriod) -> Result<Vec<PriceRow>> {
        let url = format!(
            "{}/{}?range={}&interval=1d&events=history",
            CHART_URL, ticker, period
        );
        let json = self.get_json(&url).await?;
        let prices = parse_chart(&json)?;
        Ok(trim_to_period(prices, period))
    }

    async fn fetch_balance_sheet(
        &self,
        ticker: &str,
        frequency: ReportFrequency,
    ) -> Result<Vec<FundamentalsQuarter>> {
        let url = format!(
            "{}/{}?type={}&period1=0&period2={}",
            TIMESERIES_URL,
            ticker,
            frequency.series_types(),
            Utc::now().timestamp()
        );
        let json = self.get_json(&url).await?;
        parse_timeseries(&json)
    }

    /// Shares outstanding from the quote endpoint, if reported
    pub async fn fetch_shares_outstanding(&self, ticker: &str) -> Result<Option<Decimal>> {
        let url = format!("{}?symbols={}", QUOTE_URL, ticker);
        let json = self.get_json(&url).await?;
        Ok(parse_quote_shares(&json))
    }

    /// Fetch balance-sheet periods: quarterly, falling back to annual when no
    /// quarter is reported, with missing share counts taken from the quote
    pub async fn fetch_fundamentals(&self, ticker: &str) -> Result<Vec<FundamentalsQuarter>> {
        let mut periods = self.fetch_balance_sheet(ticker, ReportFrequency::Quarterly).await?;
        if periods.is_empty() {
            log::info!("{}: no quarterly balance sheet, using annual", ticker);
            periods = self.fetch_balance_sheet(ticker, ReportFrequency::Annual).await?;
        }

        if periods.iter().any(|p| p.shares_out.is_none()) {
            match self.fetch_shares_outstanding(ticker).await {
                Ok(Some(shares)) => {
                    let filled = fill_missing_shares(&mut periods, shares);
                    log::debug!("{}: filled shares_out on {} periods from quote", ticker, filled);
                }
                Ok(None) => log::debug!("{}: quote reports no share count", ticker),
                Err(e) => log::warn!("{}: share count lookup failed: {}", ticker, e),
            }
        }

        Ok(periods)
    }

    /// Fetch prices (with retries) and fundamentals, and build a validated bundle
    pub async fn fetch_raw_bundle(
        &self,
        ticker: &str,
        period: HistoryPeriod,
        retry: &RetryPolicy,
    ) -> Result<RawBundle> {
        let mut state = RetryState::new(ticker, self.name(), retry);
        let prices = loop {
            match self.fetch_prices(ticker, period).await {
                Ok(prices) => break prices,
                Err(e) => tokio::time::sleep(state.failed(e)?).await,
            }
        };
        if state.attempts() > 0 {
            log::info!("{}: prices fetched after {} failed attempts", ticker, state.attempts());
        }

        let fundamentals = match self.fetch_fundamentals(ticker).await {
            Ok(quarters) => quarters,
            Err(e) => {
                log::warn!("{}: no fundamentals from yahoo: {}", ticker, e);
                Vec::new()
            }
        };

        assemble_bundle(ticker, prices, fundamentals)
    }
}

/// Positive `sharesOutstanding` (or `floatShares`) from a v7 quote response
pub fn parse_quote_shares(json: &Value) -> Option<Decimal> {
    let quote = json
        .get("quoteResponse")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())?;

    ["sharesOutstanding", "floatShares"]
        .iter()
        .filter_map(|key| quote.get(*key).and_then(|v| v.as_f64()))
        .find(|v| *v > 0.0)
        .and_then(Decimal::from_f64)
}

/// Set `shares_out` on every period that lacks one; returns how many were filled
pub fn fill_missing_shares(periods: &mut [FundamentalsQuarter], shares: Decimal) -> usize {
    let mut filled = 0;
    for period in periods.iter_mut().filter(|p| p.shares_out.is_none()) {
        period.shares_out = Some(shares);
        filled += 1;
    }
    filled
}

/// Parse a v8 chart response into daily rows.
///
/// Dates are taken in the exchange's local time. Bars with a null close are skipped.
pub fn parse_chart(json: &Value) -> Result<Vec<PriceRow>> {
    let result = json
        .get("chart")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());

    let result = match result {
        Some(result) => result,
        None => {
            if let Some(err) = json.get("chart").and_then(|v| v.get("error")).filter(|e| !e.is_null()) {
                return Err(MetricsError::DataError(format!("Yahoo chart error: {}", err)));
            }
            return Ok(Vec::new());
        }
    };

    let timestamps = match result.get("timestamp").and_then(|v| v.as_array()) {
        Some(ts) => ts,
        None => return Ok(Vec::new()),
    };

    let gmt_offset = result
        .get("meta")
        .and_then(|m| m.get("gmtoffset"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let indicators = result.get("indicators");
    let closes = indicators
        .and_then(|i| i.get("adjclose"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("adjclose"))
        .or_else(|| {
            indicators
                .and_then(|i| i.get("quote"))
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.get("close"))
        })
        .and_then(|v| v.as_array())
        .ok_or_else(|| MetricsError::DataError("No close series in chart response".to_string()))?;

    let mut rows = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.iter().zip(closes) {
        let (ts, close) = match (ts.as_i64(), close.as_f64()) {
            (Some(ts), Some(close)) => (ts, close),
            _ => continue,
        };
        let date = match DateTime::from_timestamp(ts + gmt_offset, 0) {
            Some(dt) => dt.date_naive(),
            None => continue,
        };
        match PriceRow::new(date, close) {
            Ok(row) => rows.push(row),
            Err(e) => log::warn!("dropping chart bar: {}", e),
        }
    }

    Ok(rows)
}

/// Parse a quarterly or annual time-series response into periods ordered by period end
pub fn parse_timeseries(json: &Value) -> Result<Vec<FundamentalsQuarter>> {
    let series = json
        .get("timeseries")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| MetricsError::DataError("No timeseries result".to_string()))?;

    let mut quarters: BTreeMap<NaiveDate, FundamentalsQuarter> = BTreeMap::new();

    for entry in series {
        let key = match entry
            .get("meta")
            .and_then(|m| m.get("type"))
            .and_then(|t| t.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
        {
            Some(key) => key,
            None => continue,
        };

        let field = match key
            .strip_prefix(ReportFrequency::Quarterly.prefix())
            .or_else(|| key.strip_prefix(ReportFrequency::Annual.prefix()))
        {
            Some(field) => field,
            None => continue,
        };

        let points = match entry.get(key).and_then(|v| v.as_array()) {
            Some(points) => points,
            None => continue,
        };

        for point in points {
            let date = point
                .get("asOfDate")
                .and_then(|v| v.as_str())
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok());
            let value = point
                .get("reportedValue")
                .and_then(|v| v.get("raw"))
                .and_then(|v| v.as_f64())
                .and_then(Decimal::from_f64);

            let (date, value) = match (date, value) {
                (Some(date), Some(value)) => (date, value),
                _ => continue,
            };

            let quarter = quarters
                .entry(date)
                .or_insert_with(|| FundamentalsQuarter::new(date));
            match field {
                DEBT_FIELD => quarter.total_debt = Some(value),
                CASH_FIELD => quarter.cash = Some(value),
                EQUITY_FIELD => quarter.book_value = Some(value),
                SHARES_FIELD => quarter.shares_out = Some(value),
                _ => {}
            }
        }
    }

    Ok(quarters
        .into_values()
        .filter(|q| match q.validate() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("dropping quarter: {}", e);
                false
            }
        })
        .collect())
}
