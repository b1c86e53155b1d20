//! Daily split-buy accumulation with a paired take-profit sell.
//!
//! Each symbol buys one slice of the principal per trading day and then
//! re-arms a limit sell for its whole position at the profit target. The
//! per-symbol state is a plain `CycleStatus` row; day 0 is a fresh cycle.

use super::sync::SyncReport;
use super::Engine;
use chrono::NaiveDate;
use log::{error, info, warn};
use serde::Serialize;
use trading::{
    round_to_cents, CycleStatus, EngineError, OrderAck, OrderRequest, OrderSide, Settings,
    StoreError, TradeLog, TradeOrigin, TradeQuery,
};

/// Shares bought by one daily slice. Never less than one, even when the
/// slice cannot cover a single share.
pub fn buy_quantity(unit_amount: f64, price: f64) -> u64 {
    if !(price > 0.0) || !unit_amount.is_finite() {
        return 1;
    }
    ((unit_amount / price).floor() as u64).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairedSell {
    pub quantity: u64,
    pub estimated_avg_cost: f64,
    /// Limit price, rounded to cents.
    pub target_price: f64,
}

impl PairedSell {
    pub fn estimated_profit(&self) -> f64 {
        (self.target_price - self.estimated_avg_cost) * self.quantity as f64
    }
}

/// Sizes the take-profit sell after today's buy.
///
/// Assumes the shares bought today can be sold in the same session, so
/// they are added to the recorded position. `bought` is 0 when the buy
/// failed. Returns `None` when there is nothing to sell.
pub fn paired_sell(
    status: &CycleStatus,
    bought: u64,
    buy_price: f64,
    target_rate: f64,
) -> Option<PairedSell> {
    let quantity = status.total_bought_qty + bought;
    if quantity == 0 {
        return None;
    }
    let estimated_avg_cost =
        (status.total_invested + bought as f64 * buy_price) / quantity as f64;
    Some(PairedSell {
        quantity,
        estimated_avg_cost,
        target_price: round_to_cents(estimated_avg_cost * (1.0 + target_rate)),
    })
}

/// Result of one order leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LegOutcome {
    Placed {
        order_id: String,
        qty: u64,
        price: f64,
        /// Set when the broker accepted the order but the store did not
        /// record it.
        #[serde(skip_serializing_if = "Option::is_none")]
        store_error: Option<String>,
    },
    Failed {
        qty: u64,
        price: f64,
        reason: String,
    },
}

impl LegOutcome {
    fn placed(order: &OrderRequest, ack: OrderAck) -> Self {
        LegOutcome::Placed {
            order_id: ack.order_id,
            qty: order.quantity(),
            price: order.price(),
            store_error: None,
        }
    }

    fn note_store_error(&mut self, err: &StoreError) {
        if let LegOutcome::Placed { store_error, .. } = self {
            *store_error = Some(match store_error.take() {
                Some(prev) => format!("{}; {}", prev, err),
                None => err.to_string(),
            });
        }
    }

    fn failed(order: &OrderRequest, reason: impl ToString) -> Self {
        LegOutcome::Failed {
            qty: order.quantity(),
            price: order.price(),
            reason: reason.to_string(),
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, LegOutcome::Placed { .. })
    }

    pub fn store_error(&self) -> Option<&str> {
        match self {
            LegOutcome::Placed { store_error, .. } => store_error.as_deref(),
            LegOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyExecution {
    pub symbol: String,
    pub price: f64,
    pub buy: LegOutcome,
    /// `None` when the symbol had no shares to sell.
    pub sell: Option<LegOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Executed(DailyExecution),
    AlreadyExecuted { symbol: String },
    Failed { symbol: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub sync: SyncReport,
    pub symbols: Vec<SymbolOutcome>,
}

impl Engine {
    /// Scheduled entry point: sync, then one daily step per configured
    /// symbol in sorted order.
    ///
    /// # Errors
    ///
    /// * `EngineError::ConfigurationMissing` - No settings row, or the
    ///   settings are inactive. Nothing was done.
    /// * Any sync failure. No symbol was run.
    pub fn run_daily(&self) -> Result<DailyReport, EngineError> {
        let settings = match self.store.load_settings()? {
            Some(s) if s.is_active => s,
            Some(_) => {
                info!("Daily run skipped: settings are inactive");
                return Err(EngineError::ConfigurationMissing(
                    "settings are inactive".into(),
                ));
            }
            None => {
                info!("Daily run skipped: no settings saved");
                return Err(EngineError::ConfigurationMissing(
                    "no settings saved".into(),
                ));
            }
        };

        let sync = self.sync_cycle_state()?;
        let mut symbols = Vec::with_capacity(settings.symbols.len());
        for symbol in &settings.symbols {
            let outcome = match self.run_daily_symbol(symbol, &settings) {
                Ok(execution) => SymbolOutcome::Executed(execution),
                Err(EngineError::AlreadyExecutedToday { symbol, .. }) => {
                    SymbolOutcome::AlreadyExecuted { symbol }
                }
                Err(err) => {
                    error!("Daily run failed for {}: {}", symbol, err);
                    SymbolOutcome::Failed {
                        symbol: symbol.clone(),
                        reason: err.to_string(),
                    }
                }
            };
            symbols.push(outcome);
        }

        Ok(DailyReport {
            date: self.clock.today(),
            sync,
            symbols,
        })
    }

    /// One day of the accumulation cycle for `symbol`.
    ///
    /// The buy and the paired sell are independent: a failed buy still
    /// re-arms the sell for the existing position, and a failed sell never
    /// undoes the buy. Order failures are reported in the returned legs, as
    /// are store failures after the broker accepted an order.
    ///
    /// # Errors
    ///
    /// * `EngineError::AlreadyExecutedToday` - A BUY of any origin is
    ///   already logged for today.
    /// * `EngineError::QuoteUnavailable` - No usable price; no order sent.
    pub fn run_daily_symbol(
        &self,
        symbol: &str,
        settings: &Settings,
    ) -> Result<DailyExecution, EngineError> {
        let symbol = symbol.trim().to_uppercase();
        let today = self.clock.today();

        let already = self.store.trades(
            &TradeQuery::new()
                .symbol(symbol.as_str())
                .side(OrderSide::Buy)
                .on(today),
        )?;
        if !already.is_empty() {
            warn!("{} already bought on {}; skipping", symbol, today);
            return Err(EngineError::AlreadyExecutedToday {
                symbol,
                date: today,
            });
        }

        let instrument = self.planner.venues().resolve(&symbol);
        let price = self.broker.current_price(&instrument)?;
        if !(price > 0.0) {
            return Err(EngineError::QuoteUnavailable {
                symbol,
                reason: format!("non-positive price {}", price),
            });
        }

        let mut status = self
            .store
            .cycle_status(&symbol)?
            .unwrap_or_else(|| CycleStatus::new(symbol.as_str()));

        let qty = buy_quantity(settings.unit_amount(), price);
        let buy_order = OrderRequest::limit(instrument.clone(), OrderSide::Buy, qty, price);
        let (buy, bought) = match self.broker.place_order(&buy_order) {
            Ok(ack) => {
                status.advance_day();
                info!(
                    "Day {} buy placed: {} (order {})",
                    status.current_cycle_day, buy_order, ack.order_id
                );
                let mut leg = LegOutcome::placed(&buy_order, ack);
                let row =
                    TradeLog::from_order(&buy_order, TradeOrigin::Daily, self.clock.now(), 0.0);
                if let Err(err) = self.store.append_trade(&row) {
                    warn!("{} bought but not logged: {}", symbol, err);
                    leg.note_store_error(&err);
                }
                if let Err(err) = self.store.upsert_cycle_status(&status) {
                    warn!(
                        "{} day {} not saved: {}",
                        symbol, status.current_cycle_day, err
                    );
                    leg.note_store_error(&err);
                }
                (leg, qty)
            }
            Err(err) => {
                error!("Buy failed for {}: {}", symbol, err);
                (LegOutcome::failed(&buy_order, err), 0)
            }
        };

        let sell = match paired_sell(&status, bought, buy_order.price(), settings.target_rate) {
            None => {
                info!("{} holds no shares; no paired sell", symbol);
                None
            }
            Some(plan) => {
                let sell_order = OrderRequest::limit(
                    instrument,
                    OrderSide::Sell,
                    plan.quantity,
                    plan.target_price,
                );
                Some(match self.broker.place_order(&sell_order) {
                    Ok(ack) => {
                        info!(
                            "Paired sell placed: {} (est. avg ${:.4}, order {})",
                            sell_order, plan.estimated_avg_cost, ack.order_id
                        );
                        let mut leg = LegOutcome::placed(&sell_order, ack);
                        let row = TradeLog::from_order(
                            &sell_order,
                            TradeOrigin::Daily,
                            self.clock.now(),
                            plan.estimated_profit(),
                        );
                        if let Err(err) = self.store.append_trade(&row) {
                            warn!("{} paired sell placed but not logged: {}", symbol, err);
                            leg.note_store_error(&err);
                        }
                        leg
                    }
                    Err(err) => {
                        error!("Paired sell failed for {}: {}", symbol, err);
                        LegOutcome::failed(&sell_order, err)
                    }
                })
            }
        };

        Ok(DailyExecution {
            symbol,
            price,
            buy,
            sell,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_quantity_floors_but_never_below_one() {
        assert_eq!(buy_quantity(250.0, 50.0), 5);
        assert_eq!(buy_quantity(250.0, 49.0), 5);
        assert_eq!(buy_quantity(250.0, 400.0), 1);
        assert_eq!(buy_quantity(250.0, 0.0), 1);
    }

    #[test]
    fn paired_sell_adds_todays_shares() {
        let mut status = CycleStatus::new("TQQQ");
        status.overwrite_from_broker(10, 48.0);

        let sell = paired_sell(&status, 5, 50.0, 0.10).unwrap();
        assert_eq!(sell.quantity, 15);
        assert!((sell.estimated_avg_cost - 730.0 / 15.0).abs() < 1e-9);
        assert_eq!(sell.target_price, 53.53);

        let sell = paired_sell(&status, 0, 50.0, 0.10).unwrap();
        assert_eq!(sell.quantity, 10);
        assert_eq!(sell.target_price, 52.8);
    }

    #[test]
    fn nothing_to_sell_without_a_position() {
        assert_eq!(paired_sell(&CycleStatus::new("TQQQ"), 0, 50.0, 0.10), None);
    }
}
