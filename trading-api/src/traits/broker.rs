//! Defines the `BrokerGateway` trait.
//!
//! The decision engine only talks to the brokerage through this contract.
//! Authentication, token refresh and network retries are the
//! implementation's business; from the engine's side every call is a plain
//! blocking function that may take a moment while a session is refreshed.

use crate::error::GatewayError;
use crate::model::{
    holding::BalanceSnapshot,
    instrument::Instrument,
    order::{OrderAck, OrderRequest},
};
use std::sync::Arc;

pub trait BrokerGateway: Send + Sync {
    /// Latest traded price of the instrument.
    ///
    /// # Errors
    ///
    /// * `GatewayError::QuoteUnavailable` - No usable quote.
    fn current_price(&self, instrument: &Instrument) -> Result<f64, GatewayError>;

    /// Daily closing prices, most recent first.
    ///
    /// # Arguments
    ///
    /// * `instrument` - The instrument to query.
    /// * `lookback` - Number of daily closes requested.
    ///
    /// # Errors
    ///
    /// * `GatewayError::InsufficientHistory` - Fewer closes than the caller
    ///   can work with. Implementations may also return a shorter series and
    ///   let the caller decide.
    fn daily_closes(&self, instrument: &Instrument, lookback: usize)
        -> Result<Vec<f64>, GatewayError>;

    /// Holdings snapshot (quantity, average cost, live price per symbol).
    fn balance(&self) -> Result<BalanceSnapshot, GatewayError>;

    /// Cash available for new orders.
    fn buying_power(&self) -> Result<f64, GatewayError>;

    /// Sends an order. Fire-and-forget: an `Ok` means the broker accepted
    /// it, not that it filled.
    fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError>;
}

impl<T: BrokerGateway + ?Sized> BrokerGateway for Arc<T> {
    fn current_price(&self, instrument: &Instrument) -> Result<f64, GatewayError> {
        (**self).current_price(instrument)
    }

    fn daily_closes(
        &self,
        instrument: &Instrument,
        lookback: usize,
    ) -> Result<Vec<f64>, GatewayError> {
        (**self).daily_closes(instrument, lookback)
    }

    fn balance(&self) -> Result<BalanceSnapshot, GatewayError> {
        (**self).balance()
    }

    fn buying_power(&self) -> Result<f64, GatewayError> {
        (**self).buying_power()
    }

    fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        (**self).place_order(order)
    }
}
