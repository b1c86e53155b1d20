use crate::model::config::{AllocationConfig, AllocationError};
use crate::weights::{self, ResolvedWeight, SignalConditions};
use log::{debug, info};
use std::collections::BTreeMap;
use strategy_lab::{MovingAverageSignal, SignalError, TrendSignal};
use trading::{
    BrokerGateway, EngineError, RebalanceAction, RebalanceItem, RebalancePlan, VenueBook,
};

/// Market inputs gathered for one configured asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSnapshot {
    pub symbol: String,
    pub quantity: u64,
    pub avg_cost: f64,
    /// Live holding price when positive, otherwise the latest close.
    pub price: f64,
    pub signal: TrendSignal,
}

/// Turns resolved weights and live account state into a `RebalancePlan`.
pub struct RebalancePlanner {
    config: AllocationConfig,
    signal: MovingAverageSignal,
    venues: VenueBook,
}

impl RebalancePlanner {
    /// Creates a planner.
    ///
    /// # Errors
    ///
    /// * `AllocationError` - The allocation is inconsistent (weights not
    ///   summing to 1.0, unknown pair members, ...).
    pub fn new(config: AllocationConfig) -> Result<Self, AllocationError> {
        let config = config.validated()?;
        Ok(Self {
            signal: MovingAverageSignal::new(config.ma_window()),
            venues: config.venue_book(),
            config,
        })
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    pub fn venues(&self) -> &VenueBook {
        &self.venues
    }

    /// Computes a fresh plan from the broker.
    ///
    /// All-or-nothing: the first missing input (cash, balance, or the history
    /// of any configured asset) aborts and no plan is returned.
    ///
    /// # Errors
    ///
    /// * `EngineError::BrokerUnavailable` - Cash or balance unavailable.
    /// * `EngineError::InsufficientHistory` - An asset has fewer closes than
    ///   the moving-average window.
    /// * `EngineError::QuoteUnavailable` - A history contains unusable prices.
    pub fn compute_plan<B>(&self, broker: &B) -> Result<RebalancePlan, EngineError>
    where
        B: BrokerGateway + ?Sized,
    {
        info!("Computing rebalance plan for {} assets", self.config.assets().len());
        let cash = broker.buying_power()?;
        let balance = broker.balance()?;

        let mut assets = Vec::with_capacity(self.config.assets().len());
        for asset in self.config.assets() {
            let instrument = self.venues.resolve(asset.symbol());
            let closes = broker.daily_closes(&instrument, self.signal.lookback())?;
            let signal = self
                .signal
                .evaluate(&closes)
                .map_err(|e| signal_failure(asset.symbol(), e))?;

            let holding = balance.get(asset.symbol());
            let price = match holding {
                Some(h) if h.current_price > 0.0 => h.current_price,
                _ => signal.latest_close,
            };
            assets.push(AssetSnapshot {
                symbol: asset.symbol().to_string(),
                quantity: holding.map_or(0, |h| h.quantity),
                avg_cost: holding.map_or(0.0, |h| h.avg_price),
                price,
                signal,
            });
        }

        let plan = build_plan(&self.config, cash, &assets);
        info!("Plan computed. {}", plan.action_summary);
        Ok(plan)
    }
}

fn signal_failure(symbol: &str, err: SignalError) -> EngineError {
    match err {
        SignalError::InsufficientHistory { got, need } => EngineError::InsufficientHistory {
            symbol: symbol.to_string(),
            got,
            need,
        },
        SignalError::NonFinite { .. } => EngineError::QuoteUnavailable {
            symbol: symbol.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Number of whole shares worth at most `target_value`.
pub fn target_quantity(target_value: f64, price: f64) -> u64 {
    if price <= 0.0 || !price.is_finite() || target_value <= 0.0 {
        return 0;
    }
    (target_value / price).floor() as u64
}

/// Flat-rate tax estimate on the gain realized by selling `quantity` shares.
/// Losses contribute zero.
pub fn estimate_tax(price: f64, avg_cost: f64, quantity: u64, tax_rate: f64) -> f64 {
    ((price - avg_cost) * quantity as f64).max(0.0) * tax_rate
}

/// Builds the plan from gathered inputs. Pure: no broker access.
pub fn build_plan(config: &AllocationConfig, cash: f64, assets: &[AssetSnapshot]) -> RebalancePlan {
    let conditions: BTreeMap<String, SignalConditions> = assets
        .iter()
        .map(|a| (a.symbol.clone(), SignalConditions::from(&a.signal)))
        .collect();
    let resolved = weights::resolve(config, &conditions);

    let total_value = cash
        + assets
            .iter()
            .map(|a| a.quantity as f64 * a.price)
            .sum::<f64>();

    let mut estimated_tax = 0.0;
    let items = assets
        .iter()
        .map(|a| {
            let weight = resolved.get(&a.symbol).copied().unwrap_or(ResolvedWeight {
                base_weight: 0.0,
                signal_weight: 0.0,
                weight: 0.0,
                kill_switch: false,
            });
            let current_value = a.quantity as f64 * a.price;
            let target_value = total_value * weight.weight;
            let target_qty = target_quantity(target_value, a.price);
            let (action, action_qty) = RebalanceAction::classify(a.quantity, target_qty);

            if action == RebalanceAction::Sell {
                estimated_tax += estimate_tax(a.price, a.avg_cost, action_qty, config.tax_rate());
            }
            debug!(
                "{}: weight {:.4} -> {:.4}, {} {} (target {} / held {})",
                a.symbol, weight.base_weight, weight.weight, action, action_qty, target_qty, a.quantity
            );

            RebalanceItem {
                symbol: a.symbol.clone(),
                current_qty: a.quantity,
                current_price: a.price,
                current_value,
                current_weight: if total_value > 0.0 {
                    current_value / total_value
                } else {
                    0.0
                },
                avg_cost: a.avg_cost,
                target_weight: weight.weight,
                target_value,
                target_qty,
                action,
                action_qty,
                ma: a.signal.ma,
                ma_prev: a.signal.ma_prev,
                below_average: a.signal.below_average,
                ma_falling: a.signal.ma_falling,
                kill_switch: weight.kill_switch,
            }
        })
        .collect();

    RebalancePlan {
        total_value,
        cash,
        items,
        estimated_tax,
        action_summary: RebalancePlan::summary(total_value, estimated_tax),
    }
}

#[cfg(test)]
mod tests;
