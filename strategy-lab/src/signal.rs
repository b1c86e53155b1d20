use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default moving-average window, in trading days.
pub const DEFAULT_WINDOW: usize = 130;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Insufficient history: got {got}, need {need}")]
    InsufficientHistory { got: usize, need: usize },

    #[error("Close at index {index} is not a finite number ({value})")]
    NonFinite { index: usize, value: f64 },
}

/// Outcome of evaluating a close series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub latest_close: f64,
    /// Today's trailing average.
    pub ma: f64,
    /// Yesterday's trailing average (same window shifted by one day).
    pub ma_prev: f64,
    /// `latest_close < ma`, compared exactly.
    pub below_average: bool,
    /// `ma < ma_prev`, compared exactly.
    pub ma_falling: bool,
}

impl TrendSignal {
    /// Both conditions hold: price under a falling average.
    pub fn is_double_strike(&self) -> bool {
        self.below_average && self.ma_falling
    }
}

/// Incremental mean. Unlike `sum / n` it returns a constant input exactly,
/// which keeps the strict comparisons quiet on a flat series.
fn running_mean(xs: &[f64]) -> f64 {
    xs.iter()
        .enumerate()
        .fold(0.0, |m, (k, x)| m + (x - m) / (k + 1) as f64)
}

/// Trailing simple moving average over closes ordered most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverageSignal {
    window: usize,
}

impl Default for MovingAverageSignal {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl MovingAverageSignal {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of closes to request from the broker: one window plus the day
    /// needed for yesterday's average.
    pub fn lookback(&self) -> usize {
        self.window + 1
    }

    /// Evaluates the signal.
    ///
    /// # Arguments
    ///
    /// * `closes` - Daily closes, index 0 = latest.
    ///
    /// # Errors
    ///
    /// * `SignalError::InsufficientHistory` - Fewer than `window` closes.
    /// * `SignalError::NonFinite` - A close inside the lookback is NaN or infinite.
    pub fn evaluate(&self, closes: &[f64]) -> Result<TrendSignal, SignalError> {
        let n = self.window;
        if closes.len() < n {
            return Err(SignalError::InsufficientHistory {
                got: closes.len(),
                need: n,
            });
        }

        let used = closes.len().min(n + 1);
        if let Some((index, value)) = closes[..used]
            .iter()
            .copied()
            .enumerate()
            .find(|(_, c)| !c.is_finite())
        {
            return Err(SignalError::NonFinite { index, value });
        }

        let ma = running_mean(&closes[..n]);
        let ma_prev = if closes.len() > n {
            running_mean(&closes[1..=n])
        } else {
            // Exactly one window: approximate yesterday's window by dropping
            // the newest close and repeating the oldest one.
            ma + (closes[n - 1] - closes[0]) / n as f64
        };

        let latest_close = closes[0];
        let signal = TrendSignal {
            latest_close,
            ma,
            ma_prev,
            below_average: latest_close < ma,
            ma_falling: ma < ma_prev,
        };
        debug!(
            "MA{}: close={:.4} ma={:.4} prev={:.4} below={} falling={}",
            n, latest_close, ma, ma_prev, signal.below_average, signal.ma_falling
        );
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(len: usize, f: impl Fn(usize) -> f64) -> Vec<f64> {
        (0..len).map(f).collect()
    }

    #[test]
    fn constant_series_triggers_nothing() {
        let closes = vec![42.0; 131];
        let s = MovingAverageSignal::default().evaluate(&closes).unwrap();
        assert_eq!(s.ma, 42.0);
        assert_eq!(s.ma_prev, 42.0);
        assert!(!s.below_average);
        assert!(!s.ma_falling);
    }

    #[test]
    fn falling_market_triggers_both_conditions() {
        // Index 0 is the latest close, so increasing with index means the
        // price has been falling over time.
        let closes = series(131, |i| 100.0 + i as f64);
        let s = MovingAverageSignal::default().evaluate(&closes).unwrap();
        assert!(s.below_average);
        assert!(s.ma_falling);
        assert!(s.is_double_strike());
        assert!((s.ma - 164.5).abs() < 1e-9);
        assert!((s.ma_prev - 165.5).abs() < 1e-9);
    }

    #[test]
    fn rising_market_triggers_neither() {
        let closes = series(131, |i| 300.0 - i as f64);
        let s = MovingAverageSignal::default().evaluate(&closes).unwrap();
        assert!(!s.below_average);
        assert!(!s.ma_falling);
    }

    #[test]
    fn short_history_is_rejected() {
        let err = MovingAverageSignal::default()
            .evaluate(&vec![1.0; 129])
            .unwrap_err();
        assert_eq!(err, SignalError::InsufficientHistory { got: 129, need: 130 });
    }

    #[test]
    fn exactly_one_window_uses_oldest_close_approximation() {
        let closes = series(130, |i| i as f64);
        let s = MovingAverageSignal::default().evaluate(&closes).unwrap();
        // ma = 64.5; dropping close 0 and repeating close 129 adds 129/130.
        assert!((s.ma_prev - (64.5 + 129.0 / 130.0)).abs() < 1e-9);
    }

    #[test]
    fn nan_inside_window_is_rejected() {
        let mut closes = vec![10.0; 131];
        closes[17] = f64::NAN;
        assert!(matches!(
            MovingAverageSignal::default().evaluate(&closes),
            Err(SignalError::NonFinite { index: 17, .. })
        ));
    }

    #[test]
    fn lookback_is_window_plus_one() {
        assert_eq!(MovingAverageSignal::default().lookback(), 131);
        assert_eq!(MovingAverageSignal::new(0).window(), 1);
    }
}
