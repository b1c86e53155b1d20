//! Property tests for the moving-average signal.

use proptest::prelude::*;
use strategy_lab::{MovingAverageSignal, DEFAULT_WINDOW};

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..500.0_f64, (DEFAULT_WINDOW + 1)..(DEFAULT_WINDOW + 40))
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

proptest! {
    /// `ma` is the mean of the 130 most recent closes and `ma_prev` the mean
    /// of the 130 closes ending one day earlier.
    #[test]
    fn averages_match_their_windows(closes in arb_closes()) {
        let s = MovingAverageSignal::default().evaluate(&closes).unwrap();
        prop_assert!((s.ma - mean(&closes[..DEFAULT_WINDOW])).abs() < 1e-9);
        prop_assert!((s.ma_prev - mean(&closes[1..=DEFAULT_WINDOW])).abs() < 1e-9);
        prop_assert_eq!(s.latest_close, closes[0]);
    }

    /// Conditions are the exact comparisons of the reported figures.
    #[test]
    fn conditions_follow_reported_figures(closes in arb_closes()) {
        let s = MovingAverageSignal::default().evaluate(&closes).unwrap();
        prop_assert_eq!(s.below_average, s.latest_close < s.ma);
        prop_assert_eq!(s.ma_falling, s.ma < s.ma_prev);
    }

    /// A flat tape never looks bearish.
    #[test]
    fn constant_series_is_neutral(price in 0.01..10_000.0_f64, extra in 0usize..20) {
        let closes = vec![price; DEFAULT_WINDOW + 1 + extra];
        let s = MovingAverageSignal::default().evaluate(&closes).unwrap();
        prop_assert!(!s.below_average);
        prop_assert!(!s.ma_falling);
    }

    /// Anything shorter than one window is refused.
    #[test]
    fn short_series_fails(len in 0usize..DEFAULT_WINDOW) {
        let closes = vec![10.0; len];
        prop_assert!(MovingAverageSignal::default().evaluate(&closes).is_err());
    }
}
