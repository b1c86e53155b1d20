use super::*;
use crate::model::config::{AssetConfig, KillSwitchPair};
use std::collections::HashMap;
use trading::{
    BalanceSnapshot, GatewayError, Holding, Instrument, OrderAck, OrderRequest, Venue,
};

/// Read-only broker double. Planning never places orders.
#[derive(Default)]
struct StubBroker {
    cash: Option<f64>,
    holdings: Vec<Holding>,
    closes: HashMap<String, Vec<f64>>,
}

impl StubBroker {
    fn with_cash(cash: f64) -> Self {
        Self {
            cash: Some(cash),
            ..Default::default()
        }
    }

    fn history(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.closes.insert(symbol.to_string(), closes);
        self
    }

    fn holding(mut self, h: Holding) -> Self {
        self.holdings.push(h);
        self
    }
}

impl BrokerGateway for StubBroker {
    fn current_price(&self, instrument: &Instrument) -> Result<f64, GatewayError> {
        self.closes
            .get(instrument.symbol())
            .and_then(|c| c.first().copied())
            .ok_or_else(|| GatewayError::QuoteUnavailable {
                symbol: instrument.symbol().to_string(),
                reason: "no data".into(),
            })
    }

    fn daily_closes(
        &self,
        instrument: &Instrument,
        lookback: usize,
    ) -> Result<Vec<f64>, GatewayError> {
        match self.closes.get(instrument.symbol()) {
            Some(c) => Ok(c.iter().take(lookback).copied().collect()),
            None => Err(GatewayError::InsufficientHistory {
                symbol: instrument.symbol().to_string(),
                got: 0,
                need: lookback,
            }),
        }
    }

    fn balance(&self) -> Result<BalanceSnapshot, GatewayError> {
        Ok(BalanceSnapshot::new(self.holdings.clone()))
    }

    fn buying_power(&self) -> Result<f64, GatewayError> {
        self.cash
            .ok_or_else(|| GatewayError::BrokerUnavailable("account locked".into()))
    }

    fn place_order(&self, _: &OrderRequest) -> Result<OrderAck, GatewayError> {
        panic!("planner placed an order")
    }
}

fn flat(price: f64) -> Vec<f64> {
    vec![price; 131]
}

/// Latest close under a falling average.
fn falling(latest: f64) -> Vec<f64> {
    (0..131).map(|i| latest + i as f64).collect()
}

fn signal(close: f64, below_average: bool, ma_falling: bool) -> TrendSignal {
    TrendSignal {
        latest_close: close,
        ma: close,
        ma_prev: close,
        below_average,
        ma_falling,
    }
}

fn two_assets() -> AllocationConfig {
    AllocationConfig::new(vec![
        AssetConfig::new("A", Venue::Nasdaq, 0.5),
        AssetConfig::new("B", Venue::Nyse, 0.5),
    ])
}

#[test]
fn test_half_weight_asset_sizes_by_floor() {
    let assets = vec![
        AssetSnapshot {
            symbol: "A".into(),
            quantity: 0,
            avg_cost: 0.0,
            price: 25.0,
            signal: signal(25.0, true, false),
        },
        AssetSnapshot {
            symbol: "B".into(),
            quantity: 0,
            avg_cost: 0.0,
            price: 30.0,
            signal: signal(30.0, false, false),
        },
    ];
    let plan = build_plan(&two_assets(), 100_000.0, &assets);

    let a = plan.item("A").unwrap();
    assert_eq!(a.target_weight, 0.25);
    assert_eq!(a.target_value, 25_000.0);
    assert_eq!(a.target_qty, 1000);
    assert_eq!(a.action, RebalanceAction::Buy);
    assert_eq!(a.action_qty, 1000);

    // 50000 / 30 = 1666.67 -> 1666
    let b = plan.item("B").unwrap();
    assert_eq!(b.target_qty, 1666);
    assert!(b.target_qty as f64 * b.current_price <= b.target_value);
    assert_eq!(plan.total_value, 100_000.0);
    assert_eq!(plan.estimated_tax, 0.0);
}

#[test]
fn test_killed_hedge_doubles_its_partner() {
    let broker = StubBroker::with_cash(10_000.0)
        .history("TQQQ", flat(50.0))
        .history("SCHD", flat(80.0))
        .history("PFIX", flat(50.0))
        .history("TMF", falling(5.0));
    let planner = RebalancePlanner::new(AllocationConfig::default()).unwrap();
    let plan = planner.compute_plan(&broker).unwrap();

    let tmf = plan.item("TMF").unwrap();
    assert!(tmf.kill_switch);
    assert!(tmf.below_average && tmf.ma_falling);
    assert_eq!(tmf.target_weight, 0.0);
    assert_eq!(tmf.action, RebalanceAction::Hold);

    let pfix = plan.item("PFIX").unwrap();
    assert!(!pfix.kill_switch);
    assert!((pfix.target_weight - 0.30).abs() < 1e-12);
    // 3000 / 50
    assert_eq!(pfix.target_qty, 60);

    let order: Vec<&str> = plan.items.iter().map(|i| i.symbol.as_str()).collect();
    assert_eq!(order, vec!["TQQQ", "PFIX", "SCHD", "TMF"]);
}

#[test]
fn test_sell_estimates_tax_on_gains_only() {
    let config = two_assets().with_tax_rate(0.22);
    let assets = vec![
        AssetSnapshot {
            symbol: "A".into(),
            quantity: 100,
            avg_cost: 40.0,
            price: 50.0,
            signal: signal(50.0, true, true),
        },
        AssetSnapshot {
            symbol: "B".into(),
            quantity: 100,
            avg_cost: 80.0,
            price: 50.0,
            signal: signal(50.0, true, true),
        },
    ];
    let plan = build_plan(&config, 0.0, &assets);

    // Equity 10000; both at 0.125 -> 1250 -> 25 shares; sell 75 each.
    let a = plan.item("A").unwrap();
    assert_eq!(a.action, RebalanceAction::Sell);
    assert_eq!(a.action_qty, 75);
    let b = plan.item("B").unwrap();
    assert_eq!(b.action_qty, 75);

    let expected = 10.0 * 75.0 * 0.22;
    assert!((plan.estimated_tax - expected).abs() < 1e-9);
    assert_eq!(
        plan.action_summary,
        format!("Equity: $10000.00, Est. Tax: ${:.2}", expected)
    );
}

#[test]
fn test_live_holding_price_wins_over_close() {
    let broker = StubBroker::with_cash(1_000.0)
        .history("A", flat(20.0))
        .history("B", flat(10.0))
        .holding(Holding::new("A", 10, 15.0, 22.0))
        .holding(Holding::new("B", 10, 9.0, 0.0));
    let planner = RebalancePlanner::new(two_assets()).unwrap();
    let plan = planner.compute_plan(&broker).unwrap();

    assert_eq!(plan.item("A").unwrap().current_price, 22.0);
    assert_eq!(plan.item("B").unwrap().current_price, 10.0);
    assert_eq!(plan.total_value, 1_000.0 + 220.0 + 100.0);
    assert_eq!(plan.cash, 1_000.0);
    assert_eq!(plan.item("A").unwrap().avg_cost, 15.0);
}

#[test]
fn test_missing_history_aborts_planning() {
    let broker = StubBroker::with_cash(10_000.0)
        .history("TQQQ", flat(50.0))
        .history("PFIX", flat(50.0))
        .history("TMF", flat(5.0));
    let planner = RebalancePlanner::new(AllocationConfig::default()).unwrap();
    let err = planner.compute_plan(&broker).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientHistory { ref symbol, .. } if symbol == "SCHD"));
    assert!(err.is_computation_failure());
}

#[test]
fn test_short_history_aborts_planning() {
    let broker = StubBroker::with_cash(10_000.0)
        .history("A", flat(50.0))
        .history("B", vec![10.0; 90]);
    let planner = RebalancePlanner::new(two_assets()).unwrap();
    assert_eq!(
        planner.compute_plan(&broker).unwrap_err(),
        EngineError::InsufficientHistory {
            symbol: "B".into(),
            got: 90,
            need: 130
        }
    );
}

#[test]
fn test_cash_failure_aborts_planning() {
    let broker = StubBroker::default().history("A", flat(1.0)).history("B", flat(1.0));
    let planner = RebalancePlanner::new(two_assets()).unwrap();
    assert!(matches!(
        planner.compute_plan(&broker),
        Err(EngineError::BrokerUnavailable(_))
    ));
}

#[test]
fn test_invalid_allocation_is_rejected_at_construction() {
    let config = AllocationConfig::new(vec![AssetConfig::new("A", Venue::Nasdaq, 0.4)]);
    assert!(RebalancePlanner::new(config).is_err());

    let config = two_assets().with_kill_pair(KillSwitchPair::new("A", "A"));
    assert!(RebalancePlanner::new(config).is_err());
}

#[test]
fn test_target_quantity_edges() {
    assert_eq!(target_quantity(99.99, 10.0), 9);
    assert_eq!(target_quantity(100.0, 0.0), 0);
    assert_eq!(target_quantity(100.0, -1.0), 0);
    assert_eq!(target_quantity(0.0, 10.0), 0);
    assert_eq!(estimate_tax(9.0, 10.0, 5, 0.22), 0.0);
}
