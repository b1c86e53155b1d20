//! Trend signals used by the rebalance planner.
//!
//! The only signal the planner needs is a trailing simple moving average
//! compared against the latest close and against its own value one day
//! earlier.

pub mod signal;

pub use signal::{MovingAverageSignal, SignalError, TrendSignal, DEFAULT_WINDOW};
