//! Metrics pipeline: rolling windows, fundamentals alignment and ratios
//!
//! `process_bundle` is the single entry point. It sorts and deduplicates the
//! price history, computes the rolling windows, forward-fills fundamentals over
//! the calendar span of the prices, joins them back onto trading dates and
//! materialises one row per trading date.

use crate::error::{MetricsError, Result};
use crate::fundamentals::{align_fundamentals, FundamentalsSnapshot};
use crate::ratios::Ratios;
use crate::rolling::{RollingMetrics, DEFAULT_LONG_WINDOW};
use crate::types::{Price, PriceRow, ProcessedRow, RawBundle, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Pipeline settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Slow moving-average window; also the short-history threshold
    pub long_window: usize,
}

impl PipelineConfig {
    pub fn new(long_window: usize) -> Result<Self> {
        if long_window == 0 {
            return Err(MetricsError::ConfigError(
                "long window must be at least 1".to_string(),
            ));
        }
        Ok(Self { long_window })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            long_window: DEFAULT_LONG_WINDOW,
        }
    }
}

/// Full daily metrics row, including the aligned fundamentals inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub date: NaiveDate,
    pub close: Price,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub high_52w: Option<f64>,
    pub book_value: Option<f64>,
    pub shares_out: Option<f64>,
    pub total_debt: Option<f64>,
    pub cash: Option<f64>,
    pub bvps: Option<f64>,
    pub pb: Option<f64>,
    pub market_cap: Option<f64>,
    pub ev: Option<f64>,
    pub pct_from_52w_high: Option<f64>,
    pub is_52w_high: Option<bool>,
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl MetricsRow {
    /// Project onto the export entity, turning any non-finite placeholder into `None`
    pub fn to_processed(&self) -> ProcessedRow {
        ProcessedRow {
            date: self.date,
            close: self.close,
            sma50: present(self.sma50),
            sma200: present(self.sma200),
            high_52w: present(self.high_52w),
            pct_from_52w_high: present(self.pct_from_52w_high),
            is_52w_high: self.is_52w_high,
            bvps: present(self.bvps),
            pb: present(self.pb),
            ev: present(self.ev),
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineOutput {
    pub ticker: Symbol,
    /// Every column, for persistence
    pub metrics: Vec<MetricsRow>,
    /// Validated rows, for export and crossover detection
    pub rows: Vec<ProcessedRow>,
}

impl PipelineOutput {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_short_history(&self, config: &PipelineConfig) -> bool {
        is_short_history(self.rows.len(), config.long_window)
    }
}

/// True when there are fewer rows than the slow window needs
pub fn is_short_history(row_count: usize, long_window: usize) -> bool {
    row_count < long_window
}

/// Sort ascending by date, keep the last row for a repeated date, drop invalid rows
fn prepare_prices(ticker: &str, prices: &[PriceRow]) -> Vec<PriceRow> {
    let mut sorted: Vec<PriceRow> = prices
        .iter()
        .filter(|row| match row.validate() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}: skipping price row: {}", ticker, e);
                false
            }
        })
        .cloned()
        .collect();
    sorted.sort_by_key(|row| row.date);

    let mut deduped: Vec<PriceRow> = Vec::with_capacity(sorted.len());
    for row in sorted {
        match deduped.last_mut() {
            Some(last) if last.date == row.date => {
                log::debug!("{}: duplicate price row for {}", ticker, row.date);
                *last = row;
            }
            _ => deduped.push(row),
        }
    }
    deduped
}

/// Run the full metrics pipeline over a raw bundle.
///
/// An empty price history produces an empty output; callers decide whether
/// that is fatal.
pub fn process_bundle(bundle: &RawBundle, config: &PipelineConfig) -> Result<PipelineOutput> {
    let config = PipelineConfig::new(config.long_window)?;
    let prices = prepare_prices(&bundle.ticker, &bundle.prices);

    let (first, last) = match (prices.first(), prices.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => {
            log::info!("{}: no price rows to process", bundle.ticker);
            return Ok(PipelineOutput {
                ticker: bundle.ticker.clone(),
                ..PipelineOutput::default()
            });
        }
    };

    let closes: Vec<f64> = prices.iter().map(|row| row.close).collect();
    let rolling = RollingMetrics::compute(&closes, config.long_window);
    let daily = align_fundamentals(&bundle.fundamentals_q, first, last);

    let metrics: Vec<MetricsRow> = prices
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let fundamentals = daily
                .get(row.date)
                .map(|aligned| aligned.values)
                .unwrap_or_default();
            build_row(row, &rolling, i, &fundamentals)
        })
        .collect();

    let rows: Vec<ProcessedRow> = metrics.iter().map(MetricsRow::to_processed).collect();

    log::info!(
        "{}: processed {} trading days ({} to {})",
        bundle.ticker,
        rows.len(),
        first,
        last
    );

    Ok(PipelineOutput {
        ticker: bundle.ticker.clone(),
        metrics,
        rows,
    })
}

fn build_row(
    price: &PriceRow,
    rolling: &RollingMetrics,
    i: usize,
    fundamentals: &FundamentalsSnapshot,
) -> MetricsRow {
    let high_52w = rolling.high_52w[i];
    let ratios = Ratios::compute(price.close, high_52w, fundamentals);

    MetricsRow {
        date: price.date,
        close: price.close,
        sma50: rolling.sma50[i],
        sma200: rolling.sma200[i],
        high_52w,
        book_value: fundamentals.book_value,
        shares_out: fundamentals.shares_out,
        total_debt: fundamentals.total_debt,
        cash: fundamentals.cash,
        bvps: ratios.bvps,
        pb: ratios.pb,
        market_cap: ratios.market_cap,
        ev: ratios.ev,
        pct_from_52w_high: ratios.pct_from_52w_high,
        is_52w_high: ratios.is_52w_high,
    }
}
