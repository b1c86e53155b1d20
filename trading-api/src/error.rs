//! Error types shared by the gateway, the store and the decision engine.

use chrono::NaiveDate;
use thiserror::Error;

/// Failures reported by a broker gateway implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// No usable quote could be obtained for the symbol.
    #[error("Quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    /// The broker returned fewer daily closes than requested.
    #[error("Insufficient history for {symbol}: got {got}, need {need}")]
    InsufficientHistory {
        symbol: String,
        got: usize,
        need: usize,
    },

    /// Balance, buying power or authentication could not be obtained.
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The broker refused the order.
    #[error("Order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },
}

/// Failures reported by a persistence store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Underlying storage engine failure.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A persisted row could not be decoded.
    #[error("Corrupt record in {table}: {reason}")]
    Corrupt { table: String, reason: String },

    /// A thread panicked while holding the store lock.
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Error taxonomy of the strategy decision engine.
///
/// Computation-stage variants (`InsufficientHistory`, `QuoteUnavailable`,
/// `BrokerUnavailable`) abort the current operation. `OrderRejected` is only
/// ever logged per item by the orchestrator. `ConfigurationMissing` and
/// `AlreadyExecutedToday` are no-ops from the caller's point of view.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Insufficient history for {symbol}: got {got}, need {need}")]
    InsufficientHistory {
        symbol: String,
        got: usize,
        need: usize,
    },

    #[error("Quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("{symbol} already executed on {date}")]
    AlreadyExecutedToday { symbol: String, date: NaiveDate },

    #[error("Order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::QuoteUnavailable { symbol, reason } => {
                EngineError::QuoteUnavailable { symbol, reason }
            }
            GatewayError::InsufficientHistory { symbol, got, need } => {
                EngineError::InsufficientHistory { symbol, got, need }
            }
            GatewayError::BrokerUnavailable(reason) => EngineError::BrokerUnavailable(reason),
            GatewayError::OrderRejected { symbol, reason } => {
                EngineError::OrderRejected { symbol, reason }
            }
        }
    }
}

impl EngineError {
    /// True for errors raised while gathering inputs (quotes, balances,
    /// history). These abort planning as a whole.
    pub fn is_computation_failure(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientHistory { .. }
                | EngineError::QuoteUnavailable { .. }
                | EngineError::BrokerUnavailable(_)
        )
    }
}

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_onto_engine_taxonomy() {
        let err: EngineError = GatewayError::InsufficientHistory {
            symbol: "TMF".into(),
            got: 12,
            need: 131,
        }
        .into();
        assert!(err.is_computation_failure());
        assert_eq!(err.to_string(), "Insufficient history for TMF: got 12, need 131");

        let err: EngineError = GatewayError::OrderRejected {
            symbol: "TQQQ".into(),
            reason: "market closed".into(),
        }
        .into();
        assert!(!err.is_computation_failure());
    }
}
