//! Order instructions sent to the broker gateway.

use super::instrument::Instrument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    #[default]
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIMIT" => Ok(OrderType::Limit),
            "MARKET" => Ok(OrderType::Market),
            other => Err(format!("unknown order type '{}'", other)),
        }
    }
}

/// Rounds a price to whole cents, half away from zero.
pub fn round_to_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// An instruction to buy or sell an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    instrument: Instrument,
    side: OrderSide,
    quantity: u64,
    price: f64,
    order_type: OrderType,
}

impl OrderRequest {
    /// Creates a limit order. The limit price is rounded to cents since the
    /// broker only accepts two decimals.
    pub fn limit(instrument: Instrument, side: OrderSide, quantity: u64, price: f64) -> Self {
        Self {
            instrument,
            side,
            quantity,
            price: round_to_cents(price),
            order_type: OrderType::Limit,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn symbol(&self) -> &str {
        self.instrument.symbol()
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Notional value of the order (`quantity * price`).
    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.price
    }
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x {} @ ${:.2} ({})",
            self.side,
            self.quantity,
            self.instrument,
            self.price,
            self.order_type.as_str()
        )
    }
}

/// Acknowledgement returned by the broker for an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub message: Option<String>,
}

impl OrderAck {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instrument::Venue;

    #[test]
    fn limit_price_is_rounded_to_cents() {
        let order = OrderRequest::limit(
            Instrument::new("TQQQ", Venue::Nasdaq),
            OrderSide::Sell,
            15,
            53.533_333,
        );
        assert_eq!(order.price(), 53.53);
        assert_eq!(order.to_string(), "SELL 15 x NAS:TQQQ @ $53.53 (LIMIT)");
    }

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("buy".parse::<OrderSide>(), Ok(OrderSide::Buy));
        assert_eq!(" SELL ".parse::<OrderSide>(), Ok(OrderSide::Sell));
        assert!("hold".parse::<OrderSide>().is_err());
    }
}
