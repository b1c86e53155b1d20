//! Turns a rebalance plan into orders.
//!
//! Sells go out before buys so the cash they free is available. A rejected
//! order is logged against its item and the batch carries on.

use super::Engine;
use log::{error, info, warn};
use serde::Serialize;
use trading::{
    EngineError, OrderRequest, OrderSide, RebalanceAction, RebalanceItem, RebalancePlan,
    TradeLog, TradeOrigin,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Dry run: the order was only logged.
    Planned,
    Placed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: u64,
    pub price: f64,
    pub status: ItemStatus,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub dry_run: bool,
    pub placed: usize,
    pub failed: usize,
    /// Items with nothing to do (HOLD or a zero quantity).
    pub skipped: usize,
    pub items: Vec<ItemOutcome>,
}

/// Estimated profit of selling `qty` at `price` against the average cost.
fn sell_profit(item: &RebalanceItem, price: f64, qty: u64) -> f64 {
    if item.avg_cost > 0.0 {
        (price - item.avg_cost) * qty as f64
    } else {
        0.0
    }
}

/// Rejects plans the orchestrator cannot execute safely.
pub(crate) fn validate_plan(
    plan: &RebalancePlan,
    known: impl Fn(&str) -> bool,
) -> Result<(), EngineError> {
    if plan.items.is_empty() {
        return Err(EngineError::InvalidPlan("plan has no items".into()));
    }
    for item in &plan.items {
        let symbol = item.symbol.trim();
        if symbol.is_empty() || !known(symbol) {
            return Err(EngineError::InvalidPlan(format!(
                "unknown symbol '{}'",
                item.symbol
            )));
        }
        let needs_price = item.action != RebalanceAction::Hold;
        if !item.current_price.is_finite()
            || item.current_price < 0.0
            || (needs_price && item.current_price == 0.0)
        {
            return Err(EngineError::InvalidPlan(format!(
                "{}: invalid price {}",
                symbol, item.current_price
            )));
        }
        let consistent = match item.action {
            RebalanceAction::Hold => item.action_qty == 0,
            RebalanceAction::Buy | RebalanceAction::Sell => item.action_qty > 0,
        };
        if !consistent {
            return Err(EngineError::InvalidPlan(format!(
                "{}: action {} with quantity {}",
                symbol, item.action, item.action_qty
            )));
        }
        if item.action == RebalanceAction::Sell && item.action_qty > item.current_qty {
            return Err(EngineError::InvalidPlan(format!(
                "{}: selling {} of {} held",
                symbol, item.action_qty, item.current_qty
            )));
        }
    }
    Ok(())
}

impl Engine {
    /// `compute_plan` followed by `execute_plan`.
    ///
    /// # Errors
    ///
    /// Only planning failures propagate. Order failures are in the report.
    pub fn rebalance(&self, dry_run: bool) -> Result<ExecutionReport, EngineError> {
        let plan = self.compute_plan()?;
        info!("Rebalance plan: {}", plan.action_summary);
        Ok(self.execute_plan(&plan, dry_run))
    }

    /// Executes a client-supplied plan after validating it against the
    /// configured assets.
    pub fn execute_custom_plan(
        &self,
        plan: &RebalancePlan,
        dry_run: bool,
    ) -> Result<ExecutionReport, EngineError> {
        let config = self.planner.config();
        validate_plan(plan, |symbol| config.asset(&symbol.to_uppercase()).is_some())?;
        Ok(self.execute_plan(plan, dry_run))
    }

    pub fn execute_plan(&self, plan: &RebalancePlan, dry_run: bool) -> ExecutionReport {
        let mut report = ExecutionReport {
            dry_run,
            ..Default::default()
        };
        report.skipped = plan.items.iter().filter(|i| !i.is_actionable()).count();

        let sells = plan.sells().filter(|i| i.is_actionable());
        let buys = plan.buys().filter(|i| i.is_actionable());
        for item in sells.chain(buys) {
            let outcome = self.execute_item(item, dry_run);
            match outcome.status {
                ItemStatus::Placed => report.placed += 1,
                ItemStatus::Failed => report.failed += 1,
                ItemStatus::Planned => {}
            }
            report.items.push(outcome);
        }

        info!(
            "Rebalance {}: {} placed, {} failed, {} skipped",
            if dry_run { "dry run" } else { "executed" },
            report.placed,
            report.failed,
            report.skipped
        );
        report
    }

    fn execute_item(&self, item: &RebalanceItem, dry_run: bool) -> ItemOutcome {
        // Callers only pass actionable items.
        let side = item.action.side().unwrap_or(OrderSide::Buy);
        let instrument = self.planner.venues().resolve(&item.symbol);
        let order = OrderRequest::limit(instrument, side, item.action_qty, item.current_price);
        let mut outcome = ItemOutcome {
            symbol: order.symbol().to_string(),
            side,
            qty: order.quantity(),
            price: order.price(),
            status: ItemStatus::Planned,
            order_id: None,
            error: None,
        };

        if dry_run {
            info!("[dry run] {}", order);
            return outcome;
        }

        match self.broker.place_order(&order) {
            Ok(ack) => {
                info!("Rebalance order placed: {} (order {})", order, ack.order_id);
                let profit = match side {
                    OrderSide::Sell => sell_profit(item, order.price(), order.quantity()),
                    OrderSide::Buy => 0.0,
                };
                let row = TradeLog::from_order(
                    &order,
                    TradeOrigin::Rebalance,
                    self.clock.now(),
                    profit,
                );
                if let Err(err) = self.store.append_trade(&row) {
                    warn!("Order {} placed but not logged: {}", ack.order_id, err);
                }
                outcome.status = ItemStatus::Placed;
                outcome.order_id = Some(ack.order_id);
            }
            Err(err) => {
                error!("Rebalance order failed: {}: {}", order, err);
                outcome.status = ItemStatus::Failed;
                outcome.error = Some(err.to_string());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(symbol: &str, action: RebalanceAction, qty: u64) -> RebalanceItem {
        RebalanceItem {
            symbol: symbol.into(),
            current_qty: 10,
            current_price: 20.0,
            action,
            action_qty: qty,
            ..Default::default()
        }
    }

    fn plan(items: Vec<RebalanceItem>) -> RebalancePlan {
        RebalancePlan {
            items,
            ..Default::default()
        }
    }

    #[test]
    fn empty_and_unknown_plans_are_invalid() {
        let known = |s: &str| s == "TQQQ";
        assert!(validate_plan(&plan(vec![]), known).is_err());
        assert!(validate_plan(&plan(vec![item("QQQ", RebalanceAction::Buy, 1)]), known).is_err());
        assert!(validate_plan(&plan(vec![item("TQQQ", RebalanceAction::Buy, 1)]), known).is_ok());
    }

    #[test]
    fn inconsistent_items_are_invalid() {
        let known = |_: &str| true;
        let hold_with_qty = plan(vec![item("TQQQ", RebalanceAction::Hold, 3)]);
        assert!(matches!(
            validate_plan(&hold_with_qty, known),
            Err(EngineError::InvalidPlan(_))
        ));
        let oversell = plan(vec![item("TQQQ", RebalanceAction::Sell, 11)]);
        assert!(validate_plan(&oversell, known).is_err());

        let mut negative = item("TQQQ", RebalanceAction::Buy, 1);
        negative.current_price = -1.0;
        assert!(validate_plan(&plan(vec![negative]), known).is_err());
    }

    #[test]
    fn orders_need_a_positive_price() {
        let known = |_: &str| true;
        let mut free = item("TQQQ", RebalanceAction::Buy, 1);
        free.current_price = 0.0;
        assert!(matches!(
            validate_plan(&plan(vec![free]), known),
            Err(EngineError::InvalidPlan(_))
        ));

        let mut unpriced_hold = item("TQQQ", RebalanceAction::Hold, 0);
        unpriced_hold.current_price = 0.0;
        assert!(validate_plan(&plan(vec![unpriced_hold]), known).is_ok());
    }

    #[test]
    fn sell_profit_needs_a_cost_basis() {
        let mut i = item("TQQQ", RebalanceAction::Sell, 4);
        assert_eq!(sell_profit(&i, 25.0, 4), 0.0);
        i.avg_cost = 20.0;
        assert_eq!(sell_profit(&i, 25.0, 4), 20.0);
    }
}
