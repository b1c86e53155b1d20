//! In-memory broker for dry runs and tests.
//!
//! Holds cash, positions, quotes and close histories. A BUY limit at or
//! above the quote fills at the quote, a SELL limit at or below the quote
//! fills at the quote. Anything else rests in the order book untouched.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use trading::{
    BalanceSnapshot, BrokerGateway, GatewayError, Holding, Instrument, OrderAck, OrderRequest,
    OrderSide, OrderType,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperOrderStatus {
    Filled,
    Resting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub id: String,
    pub request: OrderRequest,
    pub status: PaperOrderStatus,
    /// Execution price for filled orders.
    pub fill_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperPosition {
    pub quantity: u64,
    pub avg_cost: f64,
}

/// Seed file for the paper broker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSnapshot {
    pub cash: f64,
    pub positions: BTreeMap<String, PaperPosition>,
    pub quotes: HashMap<String, f64>,
    /// Daily closes per symbol, most recent first.
    pub histories: HashMap<String, Vec<f64>>,
}

#[derive(Debug, Default)]
struct PaperState {
    cash: f64,
    positions: BTreeMap<String, PaperPosition>,
    quotes: HashMap<String, f64>,
    histories: HashMap<String, Vec<f64>>,
    orders: Vec<PaperOrder>,
    rejected_symbols: HashSet<String>,
    balance_unavailable: bool,
}

#[derive(Debug, Default)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

fn key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

impl PaperBroker {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                cash: initial_cash,
                ..Default::default()
            }),
        }
    }

    pub fn from_snapshot(snapshot: PaperSnapshot) -> Self {
        let broker = Self::new(snapshot.cash);
        if let Ok(mut state) = broker.state.lock() {
            state.positions = snapshot.positions.into_iter().map(|(s, p)| (key(&s), p)).collect();
            state.quotes = snapshot.quotes.into_iter().map(|(s, q)| (key(&s), q)).collect();
            state.histories = snapshot
                .histories
                .into_iter()
                .map(|(s, h)| (key(&s), h))
                .collect();
        }
        broker
    }

    /// Loads a JSON `PaperSnapshot`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            GatewayError::BrokerUnavailable(format!("paper snapshot {}: {}", path.display(), e))
        })?;
        let snapshot: PaperSnapshot = serde_json::from_str(&raw).map_err(|e| {
            GatewayError::BrokerUnavailable(format!("paper snapshot {}: {}", path.display(), e))
        })?;
        info!(
            "Paper broker seeded from {} (cash ${:.2}, {} positions)",
            path.display(),
            snapshot.cash,
            snapshot.positions.len()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    fn lock(&self) -> Result<MutexGuard<'_, PaperState>, GatewayError> {
        self.state
            .lock()
            .map_err(|_| GatewayError::BrokerUnavailable("paper broker poisoned".into()))
    }

    // Setup helpers. A poisoned lock only happens after a panic in a test,
    // so the builders skip silently.

    pub fn with_position(self, symbol: &str, quantity: u64, avg_cost: f64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .positions
                .insert(key(symbol), PaperPosition { quantity, avg_cost });
        }
        self
    }

    pub fn with_quote(self, symbol: &str, price: f64) -> Self {
        self.set_quote(symbol, price);
        self
    }

    pub fn with_history(self, symbol: &str, closes: Vec<f64>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.histories.insert(key(symbol), closes);
        }
        self
    }

    pub fn set_quote(&self, symbol: &str, price: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.quotes.insert(key(symbol), price);
        }
    }

    /// Every order for `symbol` is rejected from now on.
    pub fn reject_orders_for(&self, symbol: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.rejected_symbols.insert(key(symbol));
        }
    }

    /// Makes `balance` and `buying_power` fail.
    pub fn set_balance_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.balance_unavailable = unavailable;
        }
    }

    /// Removes a position without touching cash, as if sold elsewhere.
    pub fn clear_position(&self, symbol: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.positions.remove(&key(symbol));
        }
    }

    pub fn orders(&self) -> Vec<PaperOrder> {
        self.state.lock().map(|s| s.orders.clone()).unwrap_or_default()
    }

    pub fn cash(&self) -> f64 {
        self.state.lock().map(|s| s.cash).unwrap_or_default()
    }

    pub fn position(&self, symbol: &str) -> Option<PaperPosition> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.positions.get(&key(symbol)).copied())
    }
}

impl PaperState {
    fn fill(&mut self, order: &OrderRequest, price: f64) -> Result<(), String> {
        let symbol = key(order.symbol());
        let qty = order.quantity();
        let notional = qty as f64 * price;
        match order.side() {
            OrderSide::Buy => {
                if notional > self.cash {
                    return Err(format!(
                        "insufficient buying power: need ${:.2}, have ${:.2}",
                        notional, self.cash
                    ));
                }
                self.cash -= notional;
                let pos = self.positions.entry(symbol).or_insert(PaperPosition {
                    quantity: 0,
                    avg_cost: 0.0,
                });
                let total = pos.quantity + qty;
                pos.avg_cost = (pos.quantity as f64 * pos.avg_cost + notional) / total as f64;
                pos.quantity = total;
            }
            OrderSide::Sell => {
                let held = self.positions.get(&symbol).map_or(0, |p| p.quantity);
                if qty > held {
                    return Err(format!("insufficient quantity: selling {}, holding {}", qty, held));
                }
                self.cash += notional;
                if qty == held {
                    self.positions.remove(&symbol);
                } else if let Some(pos) = self.positions.get_mut(&symbol) {
                    pos.quantity -= qty;
                }
            }
        }
        Ok(())
    }
}

impl BrokerGateway for PaperBroker {
    fn current_price(&self, instrument: &Instrument) -> Result<f64, GatewayError> {
        let state = self.lock()?;
        state
            .quotes
            .get(instrument.symbol())
            .copied()
            .filter(|p| *p > 0.0)
            .ok_or_else(|| GatewayError::QuoteUnavailable {
                symbol: instrument.symbol().to_string(),
                reason: "no paper quote".into(),
            })
    }

    fn daily_closes(
        &self,
        instrument: &Instrument,
        lookback: usize,
    ) -> Result<Vec<f64>, GatewayError> {
        let state = self.lock()?;
        match state.histories.get(instrument.symbol()) {
            Some(closes) if !closes.is_empty() => {
                Ok(closes.iter().take(lookback).copied().collect())
            }
            _ => Err(GatewayError::InsufficientHistory {
                symbol: instrument.symbol().to_string(),
                got: 0,
                need: lookback,
            }),
        }
    }

    fn balance(&self) -> Result<BalanceSnapshot, GatewayError> {
        let state = self.lock()?;
        if state.balance_unavailable {
            return Err(GatewayError::BrokerUnavailable("paper balance disabled".into()));
        }
        let holdings = state
            .positions
            .iter()
            .map(|(symbol, p)| {
                let price = state.quotes.get(symbol).copied().unwrap_or(0.0);
                Holding::new(symbol.clone(), p.quantity, p.avg_cost, price)
            })
            .collect();
        Ok(BalanceSnapshot::new(holdings))
    }

    fn buying_power(&self) -> Result<f64, GatewayError> {
        let state = self.lock()?;
        if state.balance_unavailable {
            return Err(GatewayError::BrokerUnavailable("paper balance disabled".into()));
        }
        Ok(state.cash)
    }

    fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let mut state = self.lock()?;
        let symbol = key(order.symbol());
        let rejected = |reason: String| {
            warn!("Paper reject {}: {}", order, reason);
            GatewayError::OrderRejected {
                symbol: symbol.clone(),
                reason,
            }
        };

        if state.rejected_symbols.contains(&symbol) {
            return Err(rejected("rejected by paper broker".into()));
        }
        if order.quantity() == 0 {
            return Err(rejected("quantity must be positive".into()));
        }

        let quote = state.quotes.get(&symbol).copied().filter(|q| *q > 0.0);
        let marketable = match (order.order_type(), quote) {
            (_, None) => None,
            (OrderType::Market, Some(q)) => Some(q),
            (OrderType::Limit, Some(q)) => match order.side() {
                OrderSide::Buy if order.price() >= q => Some(q),
                OrderSide::Sell if order.price() <= q => Some(q),
                _ => None,
            },
        };

        let id = Uuid::new_v4().to_string();
        let status = match marketable {
            Some(price) => {
                state.fill(order, price).map_err(rejected)?;
                info!("Paper fill {} at ${:.2}", order, price);
                PaperOrderStatus::Filled
            }
            None => {
                info!("Paper order resting: {}", order);
                PaperOrderStatus::Resting
            }
        };
        state.orders.push(PaperOrder {
            id: id.clone(),
            request: order.clone(),
            status,
            fill_price: marketable,
        });

        let message = match status {
            PaperOrderStatus::Filled => "filled",
            PaperOrderStatus::Resting => "resting",
        };
        Ok(OrderAck::new(id).with_message(message))
    }
}
