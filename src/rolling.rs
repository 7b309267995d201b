//! Rolling window metrics over the close-price series
//!
//! Every window is strict: a value is produced only once the window holds its
//! full number of observations. There are no partial averages during warm-up.

use std::collections::VecDeque;

/// Fast moving-average window (trading days)
pub const FAST_WINDOW: usize = 50;

/// Default slow moving-average window (trading days)
pub const DEFAULT_LONG_WINDOW: usize = 200;

/// Trailing window for the 52-week high, fixed regardless of the slow window
pub const HIGH_WINDOW: usize = 252;

/// Strict-window simple moving average.
///
/// Keeps a running total of the values in the window, so each update is O(1).
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    window: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// # Panics
    ///
    /// Panics if `window` is zero.
    pub fn new(window: usize) -> Self {
        if window == 0 {
            panic!("Window size must be greater than 0");
        }
        Self {
            window,
            values: VecDeque::with_capacity(window + 1),
            sum: 0.0,
        }
    }

    /// Add a value and return the mean once the window is full
    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        self.sum += value;
        if self.values.len() > self.window {
            if let Some(evicted) = self.values.pop_front() {
                self.sum -= evicted;
            }
        }
        self.current()
    }

    pub fn compute(window: usize, values: &[f64]) -> Vec<Option<f64>> {
        let mut sma = Self::new(window);
        values.iter().map(|&v| sma.update(v)).collect()
    }

    /// Mean of the window, `None` during warm-up
    pub fn current(&self) -> Option<f64> {
        (self.values.len() == self.window).then(|| self.sum / self.window as f64)
    }
}

/// Trailing maximum over a fixed number of observations.
///
/// Keeps a monotonically decreasing deque of `(index, value)` so each update
/// is amortised O(1).
#[derive(Debug, Clone)]
pub struct RollingMax {
    window: usize,
    seen: usize,
    candidates: VecDeque<(usize, f64)>,
}

impl RollingMax {
    /// # Panics
    ///
    /// Panics if `window` is zero.
    pub fn new(window: usize) -> Self {
        if window == 0 {
            panic!("Window size must be greater than 0");
        }
        Self {
            window,
            seen: 0,
            candidates: VecDeque::new(),
        }
    }

    /// Add a value and return the trailing max once the window is full
    pub fn update(&mut self, value: f64) -> Option<f64> {
        let idx = self.seen;
        self.seen += 1;

        while let Some(&(_, back)) = self.candidates.back() {
            if back <= value {
                self.candidates.pop_back();
            } else {
                break;
            }
        }
        self.candidates.push_back((idx, value));

        while let Some(&(front_idx, _)) = self.candidates.front() {
            if front_idx + self.window <= idx {
                self.candidates.pop_front();
            } else {
                break;
            }
        }

        if self.seen >= self.window {
            self.candidates.front().map(|&(_, v)| v)
        } else {
            None
        }
    }

    pub fn compute(window: usize, values: &[f64]) -> Vec<Option<f64>> {
        let mut max = Self::new(window);
        values.iter().map(|&v| max.update(v)).collect()
    }
}

/// Per-index rolling metrics, aligned one-to-one with the input closes
#[derive(Debug, Clone, PartialEq)]
pub struct RollingMetrics {
    pub sma50: Vec<Option<f64>>,
    pub sma200: Vec<Option<f64>>,
    pub high_52w: Vec<Option<f64>>,
}

impl RollingMetrics {
    /// Compute all three windows over closes sorted ascending by date.
    ///
    /// `long_window` sets the slow average length; it must be non-zero.
    pub fn compute(closes: &[f64], long_window: usize) -> Self {
        Self {
            sma50: SimpleMovingAverage::compute(FAST_WINDOW, closes),
            sma200: SimpleMovingAverage::compute(long_window, closes),
            high_52w: RollingMax::compute(HIGH_WINDOW, closes),
        }
    }

    pub fn len(&self) -> usize {
        self.sma50.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sma50.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_sma_warm_up_then_slides() {
        let mut sma = SimpleMovingAverage::new(4);
        for close in [10.0, 12.0, 14.0] {
            assert!(sma.update(close).is_none());
            assert!(sma.current().is_none());
        }
        assert_eq!(sma.update(16.0), Some(13.0));
        assert_eq!(sma.update(8.0), Some(12.5));
        assert_eq!(sma.current(), Some(12.5));
    }

    #[test]
    fn test_sma_window_of_one() {
        let result = SimpleMovingAverage::compute(1, &[5.0, 7.5, 6.0]);
        assert_eq!(result, vec![Some(5.0), Some(7.5), Some(6.0)]);
    }

    #[test]
    fn test_sma_running_total_stays_accurate() {
        let closes: Vec<f64> = (0..5_000).map(|i| 100.0 + (i as f64 * 0.37).sin() * 3.1).collect();
        let sma = SimpleMovingAverage::compute(50, &closes);
        let tail = &closes[closes.len() - 50..];
        let expected = tail.iter().sum::<f64>() / 50.0;
        assert_relative_eq!(sma[closes.len() - 1].unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    #[should_panic(expected = "Window size must be greater than 0")]
    fn test_sma_zero_window() {
        SimpleMovingAverage::new(0);
    }

    #[test]
    fn test_rolling_max() {
        let values = vec![3.0, 1.0, 4.0, 1.0, 5.0, 2.0, 2.0, 1.0];
        let result = RollingMax::compute(3, &values);
        assert_eq!(
            result,
            vec![None, None, Some(4.0), Some(4.0), Some(5.0), Some(5.0), Some(5.0), Some(2.0)]
        );
    }

    #[test]
    fn test_windows_on_rising_series() {
        let closes: Vec<f64> = (0..260).map(|i| 100.0 + i as f64).collect();
        let m = RollingMetrics::compute(&closes, DEFAULT_LONG_WINDOW);

        assert_eq!(m.len(), 260);
        assert!(m.sma50[48].is_none());
        assert_relative_eq!(m.sma50[49].unwrap(), 124.5, epsilon = 1e-9);
        assert!(m.sma200[198].is_none());
        assert_relative_eq!(m.sma200[199].unwrap(), 199.5, epsilon = 1e-9);
        assert!(m.high_52w[250].is_none());
        assert_eq!(m.high_52w[251], Some(351.0));
        assert_eq!(m.high_52w[259], Some(359.0));
    }

    #[test]
    fn test_short_series_all_absent() {
        let closes = vec![10.0; 49];
        let m = RollingMetrics::compute(&closes, DEFAULT_LONG_WINDOW);
        assert!(m.sma50.iter().all(Option::is_none));
        assert!(m.sma200.iter().all(Option::is_none));
        assert!(m.high_52w.iter().all(Option::is_none));
    }

    #[test]
    fn test_custom_long_window() {
        let closes: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let m = RollingMetrics::compute(&closes, 4);
        assert!(m.sma200[2].is_none());
        assert_eq!(m.sma200[3], Some(2.5));
        assert_eq!(m.sma200[9], Some(8.5));
    }

    proptest! {
        #[test]
        fn prop_sma_matches_window_mean(
            closes in prop::collection::vec(1.0f64..1000.0, 0..120),
            window in 1usize..60,
        ) {
            let sma = SimpleMovingAverage::compute(window, &closes);
            for (i, value) in sma.iter().enumerate() {
                if i + 1 < window {
                    prop_assert!(value.is_none());
                } else {
                    let slice = &closes[i + 1 - window..=i];
                    let mean = slice.iter().sum::<f64>() / window as f64;
                    prop_assert!((value.unwrap() - mean).abs() <= 1e-9 * mean.abs().max(1.0));
                }
            }
        }

        #[test]
        fn prop_rolling_max_matches_window_max(
            closes in prop::collection::vec(1.0f64..1000.0, 0..120),
            window in 1usize..60,
        ) {
            let maxes = RollingMax::compute(window, &closes);
            for (i, value) in maxes.iter().enumerate() {
                if i + 1 < window {
                    prop_assert!(value.is_none());
                } else {
                    let expected = closes[i + 1 - window..=i]
                        .iter()
                        .cloned()
                        .fold(f64::MIN, f64::max);
                    prop_assert_eq!(value.unwrap(), expected);
                }
            }
        }
    }
}
