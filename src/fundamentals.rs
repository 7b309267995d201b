//! Quarterly-to-daily fundamentals alignment
//!
//! Quarters are laid onto a continuous calendar (weekends and holidays
//! included) spanning the price history and forward-filled field by field, so
//! every trading date can look up its most recent reported values by offset.

use crate::types::FundamentalsQuarter;
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Balance-sheet values in effect on one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FundamentalsSnapshot {
    pub book_value: Option<f64>,
    pub shares_out: Option<f64>,
    pub total_debt: Option<f64>,
    pub cash: Option<f64>,
}

impl FundamentalsSnapshot {
    fn from_quarter(q: &FundamentalsQuarter) -> Self {
        Self {
            book_value: decimal_to_f64(q.book_value),
            shares_out: decimal_to_f64(q.shares_out),
            total_debt: decimal_to_f64(q.total_debt),
            cash: decimal_to_f64(q.cash),
        }
    }

    /// Overwrite each field the newer observation reports; keep the rest
    fn merge(&mut self, newer: &FundamentalsSnapshot) {
        if newer.book_value.is_some() {
            self.book_value = newer.book_value;
        }
        if newer.shares_out.is_some() {
            self.shares_out = newer.shares_out;
        }
        if newer.total_debt.is_some() {
            self.total_debt = newer.total_debt;
        }
        if newer.cash.is_some() {
            self.cash = newer.cash;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.book_value.is_none()
            && self.shares_out.is_none()
            && self.total_debt.is_none()
            && self.cash.is_none()
    }
}

fn decimal_to_f64(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64()).filter(|v| v.is_finite())
}

/// One calendar day with its forward-filled fundamentals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedFundamentals {
    pub date: NaiveDate,
    pub values: FundamentalsSnapshot,
}

/// Daily fundamentals over a continuous calendar range
#[derive(Debug, Clone, PartialEq)]
pub struct DailyFundamentals {
    start: NaiveDate,
    rows: Vec<AlignedFundamentals>,
}

impl DailyFundamentals {
    /// All calendar days in range, ascending
    pub fn rows(&self) -> &[AlignedFundamentals] {
        &self.rows
    }

    /// Constant-time lookup by calendar date; `None` outside the range
    pub fn get(&self, date: NaiveDate) -> Option<&AlignedFundamentals> {
        let offset = (date - self.start).num_days();
        if offset < 0 {
            return None;
        }
        self.rows.get(offset as usize)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Align quarters onto every calendar day in `[start, end]`.
///
/// Quarters may arrive in any order. Only quarters ending inside the range are
/// placed; days before the first of them carry no values. When several
/// quarters share a period end, the later one in input order wins for the
/// fields it reports. An inverted range yields no rows.
pub fn align_fundamentals(
    quarters: &[FundamentalsQuarter],
    start: NaiveDate,
    end: NaiveDate,
) -> DailyFundamentals {
    if end < start {
        return DailyFundamentals {
            start,
            rows: Vec::new(),
        };
    }

    let span = (end - start).num_days() as usize + 1;

    let mut sorted: Vec<&FundamentalsQuarter> = quarters.iter().collect();
    sorted.sort_by_key(|q| q.period_end);

    let mut observations: Vec<Option<FundamentalsSnapshot>> = vec![None; span];
    let mut placed = 0;

    for q in sorted {
        if q.period_end < start || q.period_end > end {
            continue;
        }
        let offset = (q.period_end - start).num_days() as usize;
        observations[offset]
            .get_or_insert_with(FundamentalsSnapshot::default)
            .merge(&FundamentalsSnapshot::from_quarter(q));
        placed += 1;
    }

    let mut carried = FundamentalsSnapshot::default();
    let mut rows = Vec::with_capacity(span);
    for (offset, observed) in observations.iter().enumerate() {
        if let Some(obs) = observed {
            carried.merge(obs);
        }
        rows.push(AlignedFundamentals {
            date: start + Duration::days(offset as i64),
            values: carried,
        });
    }

    log::debug!(
        "aligned {} of {} quarters onto {} calendar days ({} to {})",
        placed,
        quarters.len(),
        span,
        start,
        end
    );

    DailyFundamentals { start, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_empty_quarters_all_absent() {
        let daily = align_fundamentals(&[], d(2024, 1, 1), d(2024, 1, 10));
        assert_eq!(daily.len(), 10);
        assert!(daily.rows().iter().all(|r| r.values.is_empty()));
    }

    #[test]
    fn test_calendar_includes_weekends() {
        // 2024-01-05 is a Friday, 2024-01-08 a Monday
        let daily = align_fundamentals(&[], d(2024, 1, 5), d(2024, 1, 8));
        let dates: Vec<_> = daily.rows().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 5), d(2024, 1, 6), d(2024, 1, 7), d(2024, 1, 8)]);
    }

    #[test]
    fn test_forward_fill_between_quarters() {
        let quarters = vec![
            FundamentalsQuarter::new(d(2024, 6, 30)).with_book_value(dec!(200)),
            FundamentalsQuarter::new(d(2024, 3, 31)).with_book_value(dec!(100)),
        ];
        let daily = align_fundamentals(&quarters, d(2024, 3, 1), d(2024, 8, 1));

        assert_eq!(daily.get(d(2024, 3, 30)).unwrap().values.book_value, None);
        assert_eq!(daily.get(d(2024, 3, 31)).unwrap().values.book_value, Some(100.0));
        assert_eq!(daily.get(d(2024, 5, 15)).unwrap().values.book_value, Some(100.0));
        assert_eq!(daily.get(d(2024, 6, 29)).unwrap().values.book_value, Some(100.0));
        assert_eq!(daily.get(d(2024, 6, 30)).unwrap().values.book_value, Some(200.0));
        assert_eq!(daily.get(d(2024, 8, 1)).unwrap().values.book_value, Some(200.0));
    }

    #[test]
    fn test_fill_is_per_field() {
        let quarters = vec![
            FundamentalsQuarter::new(d(2024, 1, 10))
                .with_cash(dec!(5))
                .with_total_debt(dec!(7)),
            FundamentalsQuarter::new(d(2024, 1, 20)).with_total_debt(dec!(9)),
        ];
        let daily = align_fundamentals(&quarters, d(2024, 1, 1), d(2024, 1, 31));
        let late = daily.get(d(2024, 1, 25)).unwrap().values;
        assert_eq!(late.total_debt, Some(9.0));
        assert_eq!(late.cash, Some(5.0));
    }

    #[test]
    fn test_quarter_before_range_ignored() {
        let quarters = vec![
            FundamentalsQuarter::new(d(2023, 12, 31))
                .with_shares_out(dec!(1000))
                .with_book_value(dec!(50)),
            FundamentalsQuarter::new(d(2024, 1, 4)).with_book_value(dec!(70)),
        ];
        let daily = align_fundamentals(&quarters, d(2024, 1, 2), d(2024, 1, 5));

        assert!(daily.get(d(2024, 1, 2)).unwrap().values.is_empty());
        assert!(daily.get(d(2024, 1, 3)).unwrap().values.is_empty());

        let after = daily.get(d(2024, 1, 4)).unwrap().values;
        assert_eq!(after.book_value, Some(70.0));
        assert_eq!(after.shares_out, None);
    }

    #[test]
    fn test_quarter_after_range_ignored() {
        let quarters = vec![FundamentalsQuarter::new(d(2024, 3, 31)).with_cash(dec!(1))];
        let daily = align_fundamentals(&quarters, d(2024, 1, 1), d(2024, 1, 31));
        assert!(daily.rows().iter().all(|r| r.values.cash.is_none()));
    }

    #[test]
    fn test_duplicate_period_end_later_wins() {
        let quarters = vec![
            FundamentalsQuarter::new(d(2024, 1, 3))
                .with_cash(dec!(1))
                .with_book_value(dec!(10)),
            FundamentalsQuarter::new(d(2024, 1, 3)).with_cash(dec!(2)),
        ];
        let daily = align_fundamentals(&quarters, d(2024, 1, 1), d(2024, 1, 5));
        let v = daily.get(d(2024, 1, 4)).unwrap().values;
        assert_eq!(v.cash, Some(2.0));
        assert_eq!(v.book_value, Some(10.0));
    }

    #[test]
    fn test_lookup_outside_range() {
        let daily = align_fundamentals(&[], d(2024, 1, 1), d(2024, 1, 5));
        assert!(daily.get(d(2023, 12, 31)).is_none());
        assert!(daily.get(d(2024, 1, 6)).is_none());
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let daily = align_fundamentals(&[], d(2024, 2, 1), d(2024, 1, 1));
        assert!(daily.is_empty());
    }
}
