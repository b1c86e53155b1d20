//! Defines the `Store` trait for durable engine state.

use crate::error::StoreError;
use crate::model::{
    cycle::CycleStatus,
    settings::Settings,
    trade_log::{TradeLog, TradeQuery},
};
use std::sync::Arc;

/// Key-value/record storage for settings, cycle state and the trade log.
///
/// Implementations must be safe to share between threads. They do not need
/// to offer compare-and-set: callers serialize writers of the same engine.
pub trait Store: Send + Sync {
    /// The settings singleton, if one was ever saved.
    fn load_settings(&self) -> Result<Option<Settings>, StoreError>;

    /// Inserts or replaces the settings singleton.
    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;

    fn cycle_status(&self, symbol: &str) -> Result<Option<CycleStatus>, StoreError>;

    /// All cycle rows, ordered by symbol.
    fn cycle_statuses(&self) -> Result<Vec<CycleStatus>, StoreError>;

    fn upsert_cycle_status(&self, status: &CycleStatus) -> Result<(), StoreError>;

    /// Appends a trade and returns the id assigned to it.
    fn append_trade(&self, trade: &TradeLog) -> Result<i64, StoreError>;

    /// Trades matching the query, oldest first.
    fn trades(&self, query: &TradeQuery) -> Result<Vec<TradeLog>, StoreError>;
}

impl<T: Store + ?Sized> Store for Arc<T> {
    fn load_settings(&self) -> Result<Option<Settings>, StoreError> {
        (**self).load_settings()
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        (**self).save_settings(settings)
    }

    fn cycle_status(&self, symbol: &str) -> Result<Option<CycleStatus>, StoreError> {
        (**self).cycle_status(symbol)
    }

    fn cycle_statuses(&self) -> Result<Vec<CycleStatus>, StoreError> {
        (**self).cycle_statuses()
    }

    fn upsert_cycle_status(&self, status: &CycleStatus) -> Result<(), StoreError> {
        (**self).upsert_cycle_status(status)
    }

    fn append_trade(&self, trade: &TradeLog) -> Result<i64, StoreError> {
        (**self).append_trade(trade)
    }

    fn trades(&self, query: &TradeQuery) -> Result<Vec<TradeLog>, StoreError> {
        (**self).trades(query)
    }
}
