//! Golden/death cross detection over the fast and slow moving averages
//!
//! A three-state machine walks the rows in date order. A row missing either
//! average resets the machine to `Unknown`, and no event fires on the first
//! complete row after a reset, so warm-up periods and data gaps never produce
//! signals.

use crate::types::{ProcessedRow, SignalEvent, SignalType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Relative position of the fast average against the slow one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossState {
    /// No complete prior observation
    #[default]
    Unknown,
    /// sma50 >= sma200
    Above,
    /// sma50 < sma200
    Below,
}

impl CrossState {
    fn classify(fast: f64, slow: f64) -> Self {
        if fast >= slow {
            CrossState::Above
        } else {
            CrossState::Below
        }
    }
}

/// Averages around a transition, kept for audit and export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossoverContext {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: SignalType,
    pub sma50_prev: f64,
    pub sma200_prev: f64,
    pub sma50_cur: f64,
    pub sma200_cur: f64,
}

/// Incremental crossover state machine
#[derive(Debug, Clone, Default)]
pub struct CrossoverDetector {
    state: CrossState,
    prev: Option<(f64, f64)>,
}

impl CrossoverDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CrossState {
        self.state
    }

    /// Feed one row's averages; returns the transition this row completes, if any
    pub fn update(
        &mut self,
        date: NaiveDate,
        sma50: Option<f64>,
        sma200: Option<f64>,
    ) -> Option<CrossoverContext> {
        let (fast, slow) = match (sma50, sma200) {
            (Some(fast), Some(slow)) if fast.is_finite() && slow.is_finite() => (fast, slow),
            _ => {
                self.reset();
                return None;
            }
        };

        let cur = CrossState::classify(fast, slow);
        let kind = match (self.state, cur) {
            (CrossState::Below, CrossState::Above) => Some(SignalType::GoldenCross),
            (CrossState::Above, CrossState::Below) => Some(SignalType::DeathCross),
            _ => None,
        };

        let context = match (kind, self.prev) {
            (Some(kind), Some((fast_prev, slow_prev))) => Some(CrossoverContext {
                date,
                kind,
                sma50_prev: fast_prev,
                sma200_prev: slow_prev,
                sma50_cur: fast,
                sma200_cur: slow,
            }),
            _ => None,
        };

        self.state = cur;
        self.prev = Some((fast, slow));
        context
    }

    pub fn reset(&mut self) {
        self.state = CrossState::Unknown;
        self.prev = None;
    }
}

/// Detect crossovers across a ticker's rows.
///
/// Rows are visited in ascending date order whatever order they arrive in.
/// Returns the events and their contexts, one-to-one and chronological.
pub fn detect_crossovers(
    ticker: &str,
    rows: &[ProcessedRow],
) -> (Vec<SignalEvent>, Vec<CrossoverContext>) {
    let mut ordered: Vec<&ProcessedRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.date);

    let mut detector = CrossoverDetector::new();
    let mut events = Vec::new();
    let mut contexts = Vec::new();

    for row in ordered {
        if let Some(ctx) = detector.update(row.date, row.sma50, row.sma200) {
            log::debug!("{}: {} on {}", ticker, ctx.kind, ctx.date);
            events.push(SignalEvent::new(ticker, ctx.date, ctx.kind));
            contexts.push(ctx);
        }
    }

    (events, contexts)
}
