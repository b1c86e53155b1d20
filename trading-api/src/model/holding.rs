use serde::{Deserialize, Serialize};

/// A single position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: u64,
    /// Average purchase price.
    pub avg_price: f64,
    /// Live price reported alongside the position. May be 0 when the
    /// broker did not price it.
    pub current_price: f64,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, quantity: u64, avg_price: f64, current_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_price,
            current_price,
        }
    }

    pub fn market_value(&self) -> f64 {
        self.quantity as f64 * self.current_price
    }
}

/// Holdings snapshot returned by `GetBalance`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    holdings: Vec<Holding>,
}

impl BalanceSnapshot {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn get(&self, symbol: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.symbol == symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}
