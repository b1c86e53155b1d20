//! Trend rules applied to base weights.
//!
//! Resolution happens in two passes. The per-symbol pass halves the weight
//! once per active condition and kills a paired hedge when both conditions
//! hold. The pair pass runs afterwards over the complete set and doubles the
//! surviving member of a half-killed pair.

use crate::model::config::{AllocationConfig, KillSwitchPair};
use log::info;
use std::collections::BTreeMap;
use strategy_lab::TrendSignal;

/// Factor applied once per active condition.
pub const CONDITION_FACTOR: f64 = 0.5;

/// The two boolean conditions the resolver reads from a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalConditions {
    pub below_average: bool,
    pub ma_falling: bool,
}

impl SignalConditions {
    pub fn new(below_average: bool, ma_falling: bool) -> Self {
        Self {
            below_average,
            ma_falling,
        }
    }

    pub fn both(&self) -> bool {
        self.below_average && self.ma_falling
    }
}

impl From<&TrendSignal> for SignalConditions {
    fn from(signal: &TrendSignal) -> Self {
        Self::new(signal.below_average, signal.ma_falling)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedWeight {
    pub base_weight: f64,
    /// Weight after the per-symbol pass. The pair pass always starts from
    /// this value, never from `weight`.
    pub signal_weight: f64,
    /// Final weight.
    pub weight: f64,
    pub kill_switch: bool,
}

/// Per-symbol pass.
///
/// # Arguments
///
/// * `base_weight` - Configured fraction of equity.
/// * `conditions` - Signal conditions for the symbol.
/// * `paired` - Whether the symbol belongs to a kill-switch pair.
pub fn resolve_symbol(base_weight: f64, conditions: SignalConditions, paired: bool) -> ResolvedWeight {
    if paired && conditions.both() {
        return ResolvedWeight {
            base_weight,
            signal_weight: 0.0,
            weight: 0.0,
            kill_switch: true,
        };
    }

    let mut weight = base_weight;
    if conditions.below_average {
        weight *= CONDITION_FACTOR;
    }
    if conditions.ma_falling {
        weight *= CONDITION_FACTOR;
    }
    ResolvedWeight {
        base_weight,
        signal_weight: weight,
        weight,
        kill_switch: false,
    }
}

/// Pair pass. Recomputes `weight` from `signal_weight` for every pair member,
/// so applying it again leaves the set unchanged.
pub fn apply_kill_pairs(weights: &mut BTreeMap<String, ResolvedWeight>, pairs: &[KillSwitchPair]) {
    for pair in pairs {
        let (Some(first), Some(second)) = (
            weights.get(pair.first()).copied(),
            weights.get(pair.second()).copied(),
        ) else {
            continue;
        };

        for (symbol, member, partner) in [
            (pair.first(), first, second),
            (pair.second(), second, first),
        ] {
            if member.kill_switch {
                continue;
            }
            let weight = if partner.kill_switch {
                info!(
                    "{} killed, doubling {} weight to {:.4}",
                    pair.partner(symbol).unwrap_or_default(),
                    symbol,
                    member.signal_weight * 2.0
                );
                member.signal_weight * 2.0
            } else {
                member.signal_weight
            };
            if let Some(entry) = weights.get_mut(symbol) {
                entry.weight = weight;
            }
        }
    }
}

/// Resolves every configured asset.
///
/// Symbols without conditions are treated as neutral. The result need not
/// sum to 1.0; the planner leaves the remainder in cash.
pub fn resolve(
    config: &AllocationConfig,
    conditions: &BTreeMap<String, SignalConditions>,
) -> BTreeMap<String, ResolvedWeight> {
    let mut weights: BTreeMap<String, ResolvedWeight> = config
        .assets()
        .iter()
        .map(|asset| {
            let c = conditions.get(asset.symbol()).copied().unwrap_or_default();
            let paired = config.pair_of(asset.symbol()).is_some();
            (
                asset.symbol().to_string(),
                resolve_symbol(asset.base_weight(), c, paired),
            )
        })
        .collect();
    apply_kill_pairs(&mut weights, config.kill_pairs());
    weights
}
