//! Valuation ratios and 52-week-high measures for a single daily row
//!
//! Every ratio is optional. A missing operand, a zero or negative denominator,
//! or a non-finite result yields `None` rather than an error or infinity.

use crate::fundamentals::FundamentalsSnapshot;

/// Absolute tolerance for treating a close as equal to its trailing high
pub const HIGH_EPSILON: f64 = 1e-8;

fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Book value per share, only for positive book value and share count
pub fn book_value_per_share(book_value: Option<f64>, shares_out: Option<f64>) -> Option<f64> {
    let book_value = positive(book_value)?;
    let shares_out = positive(shares_out)?;
    finite(book_value / shares_out)
}

/// Price to book, only for a positive book value per share
pub fn price_to_book(close: f64, bvps: Option<f64>) -> Option<f64> {
    let bvps = positive(bvps)?;
    finite(close / bvps)
}

/// Market capitalisation from close and shares outstanding
pub fn market_cap(close: f64, shares_out: Option<f64>) -> Option<f64> {
    shares_out.and_then(|shares| finite(close * shares))
}

/// Enterprise value: market cap + debt - cash.
///
/// Missing debt or cash count as zero here; a missing market cap makes the
/// whole value absent.
pub fn enterprise_value(
    market_cap: Option<f64>,
    total_debt: Option<f64>,
    cash: Option<f64>,
) -> Option<f64> {
    let market_cap = market_cap?;
    finite(market_cap + total_debt.unwrap_or(0.0) - cash.unwrap_or(0.0))
}

/// Fractional distance of the close below its trailing high (0.0 at the high)
pub fn pct_from_high(close: f64, high: Option<f64>) -> Option<f64> {
    let high = positive(high)?;
    finite((close - high) / high)
}

/// Whether the close sits at its trailing high; `None` while the high is unknown
pub fn is_at_high(close: f64, high: Option<f64>) -> Option<bool> {
    high.map(|h| (close - h).abs() <= HIGH_EPSILON)
}

/// All derived values for one daily row
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ratios {
    pub bvps: Option<f64>,
    pub pb: Option<f64>,
    pub market_cap: Option<f64>,
    pub ev: Option<f64>,
    pub pct_from_52w_high: Option<f64>,
    pub is_52w_high: Option<bool>,
}

impl Ratios {
    /// Compute in dependency order: bvps, pb, market cap, ev, then the high measures
    pub fn compute(close: f64, high_52w: Option<f64>, fundamentals: &FundamentalsSnapshot) -> Self {
        let bvps = book_value_per_share(fundamentals.book_value, fundamentals.shares_out);
        let pb = price_to_book(close, bvps);
        let market_cap = market_cap(close, fundamentals.shares_out);
        let ev = enterprise_value(market_cap, fundamentals.total_debt, fundamentals.cash);

        Self {
            bvps,
            pb,
            market_cap,
            ev,
            pct_from_52w_high: pct_from_high(close, high_52w),
            is_52w_high: is_at_high(close, high_52w),
        }
    }
}
