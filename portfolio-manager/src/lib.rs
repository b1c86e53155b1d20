//! Target allocation and rebalance planning.
//!
//! `RebalancePlanner` gathers cash, holdings and price history from a
//! `BrokerGateway`, runs the moving-average signal per asset, resolves the
//! target weights and converts them into whole-share buy/sell actions.

pub mod model;
pub mod planner;
pub mod weights;

pub use model::config::{AllocationConfig, AllocationError, AssetConfig, KillSwitchPair};
pub use planner::{build_plan, AssetSnapshot, RebalancePlanner};
pub use weights::{ResolvedWeight, SignalConditions};
