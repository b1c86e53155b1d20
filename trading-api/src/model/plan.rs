//! Rebalance plan produced by the planner and consumed by the orchestrator.
//!
//! Plans are ephemeral: they are computed on request, optionally shown to a
//! user, and executed. They serialize with snake_case keys so a client can
//! round-trip an edited plan.

use super::order::OrderSide;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RebalanceAction {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl RebalanceAction {
    /// Classifies the move from `current` to `target` shares.
    pub fn classify(current: u64, target: u64) -> (Self, u64) {
        if target > current {
            (RebalanceAction::Buy, target - current)
        } else if target < current {
            (RebalanceAction::Sell, current - target)
        } else {
            (RebalanceAction::Hold, 0)
        }
    }

    pub fn side(&self) -> Option<OrderSide> {
        match self {
            RebalanceAction::Buy => Some(OrderSide::Buy),
            RebalanceAction::Sell => Some(OrderSide::Sell),
            RebalanceAction::Hold => None,
        }
    }
}

impl fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RebalanceAction::Buy => "BUY",
            RebalanceAction::Sell => "SELL",
            RebalanceAction::Hold => "HOLD",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceItem {
    pub symbol: String,
    pub current_qty: u64,
    pub current_price: f64,
    #[serde(rename = "current_val")]
    pub current_value: f64,
    #[serde(rename = "current_wt")]
    pub current_weight: f64,
    /// Average cost of the held position, used for tax and profit estimates.
    #[serde(default)]
    pub avg_cost: f64,

    #[serde(rename = "target_wt")]
    pub target_weight: f64,
    #[serde(rename = "target_val")]
    pub target_value: f64,
    pub target_qty: u64,
    pub action: RebalanceAction,
    pub action_qty: u64,

    #[serde(rename = "ma_130")]
    pub ma: f64,
    #[serde(rename = "ma_130_prev")]
    pub ma_prev: f64,
    #[serde(rename = "cond_price_under_ma")]
    pub below_average: bool,
    #[serde(rename = "cond_ma_down")]
    pub ma_falling: bool,
    pub kill_switch: bool,
}

impl RebalanceItem {
    /// Whether the orchestrator has anything to send for this item.
    pub fn is_actionable(&self) -> bool {
        self.action != RebalanceAction::Hold && self.action_qty > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub total_value: f64,
    pub cash: f64,
    pub items: Vec<RebalanceItem>,
    pub estimated_tax: f64,
    pub action_summary: String,
}

impl RebalancePlan {
    pub fn summary(total_value: f64, estimated_tax: f64) -> String {
        format!("Equity: ${:.2}, Est. Tax: ${:.2}", total_value, estimated_tax)
    }

    pub fn sells(&self) -> impl Iterator<Item = &RebalanceItem> {
        self.items
            .iter()
            .filter(|i| i.action == RebalanceAction::Sell)
    }

    pub fn buys(&self) -> impl Iterator<Item = &RebalanceItem> {
        self.items
            .iter()
            .filter(|i| i.action == RebalanceAction::Buy)
    }

    pub fn item(&self, symbol: &str) -> Option<&RebalanceItem> {
        self.items.iter().find(|i| i.symbol == symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_share_delta() {
        assert_eq!(RebalanceAction::classify(10, 14), (RebalanceAction::Buy, 4));
        assert_eq!(RebalanceAction::classify(10, 3), (RebalanceAction::Sell, 7));
        assert_eq!(RebalanceAction::classify(10, 10), (RebalanceAction::Hold, 0));
    }

    #[test]
    fn plan_json_uses_dashboard_keys() {
        let plan = RebalancePlan {
            total_value: 1000.0,
            cash: 100.0,
            items: vec![RebalanceItem {
                symbol: "TMF".into(),
                action: RebalanceAction::Sell,
                action_qty: 3,
                kill_switch: true,
                ..Default::default()
            }],
            estimated_tax: 0.0,
            action_summary: RebalancePlan::summary(1000.0, 0.0),
        };
        let json = serde_json::to_value(&plan).unwrap();
        let item = &json["items"][0];
        assert_eq!(item["action"], "SELL");
        assert_eq!(item["kill_switch"], true);
        assert!(item.get("ma_130_prev").is_some());
        assert!(item.get("cond_ma_down").is_some());
        assert_eq!(json["action_summary"], "Equity: $1000.00, Est. Tax: $0.00");

        let back: RebalancePlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }
}
