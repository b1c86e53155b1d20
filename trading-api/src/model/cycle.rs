//! Per-symbol accumulation cycle state.
//!
//! The cycle has no explicit state enum: day 0 means a fresh cycle, any
//! positive day means shares are being accumulated. The only transition
//! that is not a plain increment is the reset to 0, which happens when the
//! broker reports an empty position.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStatus {
    pub symbol: String,
    pub current_cycle_day: u32,
    pub total_bought_qty: u64,
    pub avg_price: f64,
    pub total_invested: f64,
}

impl CycleStatus {
    /// An empty cycle (day 0, no position).
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            current_cycle_day: 0,
            total_bought_qty: 0,
            avg_price: 0.0,
            total_invested: 0.0,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.current_cycle_day == 0
    }

    /// Overwrites position totals with broker truth.
    ///
    /// Keeps `total_invested == total_bought_qty * avg_price` and restarts
    /// the cycle when the reported quantity is 0. The day counter is
    /// otherwise left alone: the broker does not know about it.
    pub fn overwrite_from_broker(&mut self, quantity: u64, avg_price: f64) {
        self.total_bought_qty = quantity;
        self.avg_price = if quantity == 0 { 0.0 } else { avg_price };
        self.total_invested = quantity as f64 * self.avg_price;
        if quantity == 0 {
            self.current_cycle_day = 0;
        }
    }

    /// Optimistic bump after a buy order was accepted. Position totals are
    /// not touched here; the next sync brings them in from the broker.
    pub fn advance_day(&mut self) {
        self.current_cycle_day += 1;
    }
}
