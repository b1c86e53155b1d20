//! Append-only record of orders accepted by the broker.
//!
//! The trade log doubles as the idempotency ledger of the daily cycle: a
//! DAILY BUY row for a symbol on a given date means that day is done.

use super::order::{OrderRequest, OrderSide, OrderType};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which engine produced a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeOrigin {
    Daily,
    Rebalance,
}

impl TradeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOrigin::Daily => "DAILY",
            TradeOrigin::Rebalance => "REBALANCE",
        }
    }
}

impl fmt::Display for TradeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(TradeOrigin::Daily),
            "REBALANCE" => Ok(TradeOrigin::Rebalance),
            other => Err(format!("unknown trade origin '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    /// Assigned by the store on append.
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub executed_at: NaiveDateTime,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub origin: TradeOrigin,
    pub qty: u64,
    pub price: f64,
    pub amount: f64,
    /// Estimated realized profit. Always 0 for buys.
    pub profit: f64,
}

impl TradeLog {
    /// Builds a log row for an order that the broker accepted.
    pub fn from_order(
        order: &OrderRequest,
        origin: TradeOrigin,
        executed_at: NaiveDateTime,
        profit: f64,
    ) -> Self {
        Self {
            id: None,
            date: executed_at.date(),
            executed_at,
            symbol: order.symbol().to_string(),
            side: order.side(),
            order_type: order.order_type(),
            origin,
            qty: order.quantity(),
            price: order.price(),
            amount: order.notional(),
            profit: match order.side() {
                OrderSide::Buy => 0.0,
                OrderSide::Sell => profit,
            },
        }
    }
}

/// Filter over the trade log. Every unset field matches everything; date
/// bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeQuery {
    pub symbol: Option<String>,
    pub side: Option<OrderSide>,
    pub origin: Option<TradeOrigin>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl TradeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    pub fn origin(mut self, origin: TradeOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn on(self, date: NaiveDate) -> Self {
        self.between(date, date)
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, trade: &TradeLog) -> bool {
        self.symbol.as_deref().map_or(true, |s| s == trade.symbol)
            && self.side.map_or(true, |s| s == trade.side)
            && self.origin.map_or(true, |o| o == trade.origin)
            && self.from.map_or(true, |d| trade.date >= d)
            && self.to.map_or(true, |d| trade.date <= d)
    }
}
