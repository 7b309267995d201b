//! Core types and constants

use crate::error::{MetricsError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price type (using f64 for precision)
pub type Price = f64;

/// Ticker symbol identifier
pub type Symbol = String;

/// Date format used for every persisted and exported calendar date
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One trading day of price history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: Option<Price>,
    pub high: Option<Price>,
    pub low: Option<Price>,
    pub close: Price,
    pub volume: Option<u64>,
}

impl PriceRow {
    /// Create a close-only row
    pub fn new(date: NaiveDate, close: Price) -> Result<Self> {
        let row = Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        };
        row.validate()?;
        Ok(row)
    }

    /// Create a full OHLCV row
    pub fn with_ohlcv(
        date: NaiveDate,
        open: Option<Price>,
        high: Option<Price>,
        low: Option<Price>,
        close: Price,
        volume: Option<u64>,
    ) -> Result<Self> {
        let row = Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        };
        row.validate()?;
        Ok(row)
    }

    /// Check the row invariants: positive finite close, high >= low
    pub fn validate(&self) -> Result<()> {
        if !self.close.is_finite() || self.close <= 0.0 {
            return Err(MetricsError::InvalidPriceRow(format!(
                "{}: close must be a positive finite number, got {}",
                self.date, self.close
            )));
        }
        if let (Some(high), Some(low)) = (self.high, self.low) {
            if high < low {
                return Err(MetricsError::InvalidPriceRow(format!(
                    "{}: high {} is below low {}",
                    self.date, high, low
                )));
            }
        }
        Ok(())
    }
}

/// One quarterly filing period of balance-sheet data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsQuarter {
    pub period_end: NaiveDate,
    pub total_debt: Option<Decimal>,
    pub cash: Option<Decimal>,
    pub shares_out: Option<Decimal>,
    pub book_value: Option<Decimal>,
    pub revenue: Option<Decimal>,
    pub ebitda: Option<Decimal>,
}

impl FundamentalsQuarter {
    /// Create a quarter with no reported fields
    pub fn new(period_end: NaiveDate) -> Self {
        Self {
            period_end,
            total_debt: None,
            cash: None,
            shares_out: None,
            book_value: None,
            revenue: None,
            ebitda: None,
        }
    }

    pub fn with_total_debt(mut self, total_debt: Decimal) -> Self {
        self.total_debt = Some(total_debt);
        self
    }

    pub fn with_cash(mut self, cash: Decimal) -> Self {
        self.cash = Some(cash);
        self
    }

    pub fn with_shares_out(mut self, shares_out: Decimal) -> Self {
        self.shares_out = Some(shares_out);
        self
    }

    pub fn with_book_value(mut self, book_value: Decimal) -> Self {
        self.book_value = Some(book_value);
        self
    }

    /// Parse an ISO period-end date such as `2024-03-31`
    pub fn parse_period_end(s: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| {
            MetricsError::InvalidFundamentals(format!("unparseable period_end '{}': {}", s, e))
        })
    }

    /// Reject negative debt, cash or share counts.
    ///
    /// Book value may legitimately be negative (negative equity).
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("total_debt", self.total_debt),
            ("cash", self.cash),
            ("shares_out", self.shares_out),
        ];
        for (name, value) in checks {
            if let Some(v) = value {
                if v.is_sign_negative() && !v.is_zero() {
                    return Err(MetricsError::InvalidFundamentals(format!(
                        "{}: {} must be non-negative, got {}",
                        self.period_end, name, v
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Raw inputs for one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBundle {
    pub ticker: Symbol,
    pub prices: Vec<PriceRow>,
    pub fundamentals_q: Vec<FundamentalsQuarter>,
}

impl RawBundle {
    /// Create a bundle from rows that are already known to be valid
    pub fn new(
        ticker: impl Into<Symbol>,
        prices: Vec<PriceRow>,
        fundamentals_q: Vec<FundamentalsQuarter>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            prices,
            fundamentals_q,
        }
    }

    /// Build a bundle, dropping individually invalid rows.
    ///
    /// Fails only when price rows were supplied and every one of them was rejected.
    pub fn from_rows(
        ticker: impl Into<Symbol>,
        prices: Vec<PriceRow>,
        fundamentals_q: Vec<FundamentalsQuarter>,
    ) -> Result<Self> {
        let ticker = ticker.into();
        let supplied = prices.len();

        let prices: Vec<PriceRow> = prices
            .into_iter()
            .filter(|row| match row.validate() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("{}: dropping price row: {}", ticker, e);
                    false
                }
            })
            .collect();

        if supplied > 0 && prices.is_empty() {
            return Err(MetricsError::NoValidRows {
                ticker,
                rejected: supplied,
            });
        }

        let fundamentals_q = fundamentals_q
            .into_iter()
            .filter(|q| match q.validate() {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("{}: dropping fundamentals quarter: {}", ticker, e);
                    false
                }
            })
            .collect();

        Ok(Self {
            ticker,
            prices,
            fundamentals_q,
        })
    }
}

/// One validated daily metrics row, the export entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRow {
    pub date: NaiveDate,
    pub close: Price,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub high_52w: Option<f64>,
    pub pct_from_52w_high: Option<f64>,
    pub is_52w_high: Option<bool>,
    pub bvps: Option<f64>,
    pub pb: Option<f64>,
    pub ev: Option<f64>,
}

/// Moving-average crossover direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Fast average moved from below to at-or-above the slow average
    GoldenCross,
    /// Fast average moved from at-or-above to below the slow average
    DeathCross,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::GoldenCross => "golden_cross",
            SignalType::DeathCross => "death_cross",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "golden_cross" => Ok(SignalType::GoldenCross),
            "death_cross" => Ok(SignalType::DeathCross),
            other => Err(MetricsError::ParseError(format!(
                "unknown signal type '{}'",
                other
            ))),
        }
    }
}

/// A detected crossover event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub ticker: Symbol,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: SignalType,
}

impl SignalEvent {
    pub fn new(ticker: impl Into<Symbol>, date: NaiveDate, kind: SignalType) -> Self {
        Self {
            ticker: ticker.into(),
            date,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_price_row_rejects_bad_close() {
        assert!(PriceRow::new(d(2024, 1, 2), 100.0).is_ok());
        assert!(PriceRow::new(d(2024, 1, 2), 0.0).is_err());
        assert!(PriceRow::new(d(2024, 1, 2), -3.0).is_err());
        assert!(PriceRow::new(d(2024, 1, 2), f64::NAN).is_err());
        assert!(PriceRow::new(d(2024, 1, 2), f64::INFINITY).is_err());
    }

    #[test]
    fn test_price_row_high_below_low() {
        let err = PriceRow::with_ohlcv(d(2024, 1, 2), Some(10.0), Some(9.0), Some(11.0), 10.0, None)
            .unwrap_err();
        assert!(err.to_string().contains("below low"));

        let ok = PriceRow::with_ohlcv(d(2024, 1, 2), Some(10.0), Some(12.0), Some(9.0), 10.5, Some(500));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_quarter_validation() {
        let q = FundamentalsQuarter::new(d(2024, 3, 31))
            .with_book_value(dec!(-50))
            .with_shares_out(dec!(10));
        assert!(q.validate().is_ok());

        let q = FundamentalsQuarter::new(d(2024, 3, 31)).with_cash(dec!(-1));
        assert!(q.validate().is_err());

        let q = FundamentalsQuarter::new(d(2024, 3, 31)).with_total_debt(dec!(0));
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_parse_period_end() {
        assert_eq!(
            FundamentalsQuarter::parse_period_end("2024-06-30").unwrap(),
            d(2024, 6, 30)
        );
        assert!(FundamentalsQuarter::parse_period_end("Q2 2024").is_err());
    }

    #[test]
    fn test_bundle_drops_invalid_rows() {
        let good = PriceRow::new(d(2024, 1, 2), 100.0).unwrap();
        let mut bad = good.clone();
        bad.date = d(2024, 1, 3);
        bad.close = f64::NAN;

        let bundle = RawBundle::from_rows("TEST", vec![good.clone(), bad], vec![]).unwrap();
        assert_eq!(bundle.prices, vec![good]);
    }

    #[test]
    fn test_bundle_all_invalid_is_error() {
        let mut bad = PriceRow::new(d(2024, 1, 2), 1.0).unwrap();
        bad.close = -1.0;
        let err = RawBundle::from_rows("TEST", vec![bad], vec![]).unwrap_err();
        assert!(matches!(err, MetricsError::NoValidRows { rejected: 1, .. }));
    }

    #[test]
    fn test_bundle_empty_input_is_not_error() {
        let bundle = RawBundle::from_rows("TEST", vec![], vec![]).unwrap();
        assert!(bundle.prices.is_empty());
    }

    #[test]
    fn test_signal_type_round_trip_str() {
        assert_eq!("golden_cross".parse::<SignalType>().unwrap(), SignalType::GoldenCross);
        assert_eq!(SignalType::DeathCross.to_string(), "death_cross");
        assert!("sideways".parse::<SignalType>().is_err());
    }

    #[test]
    fn test_signal_event_serializes_type_field() {
        let event = SignalEvent::new("TEST", d(2024, 2, 1), SignalType::GoldenCross);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "golden_cross");
        assert_eq!(json["date"], "2024-02-01");
    }
}
