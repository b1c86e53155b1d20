//! Property tests for weight resolution and share sizing.

use portfolio_manager::planner::target_quantity;
use portfolio_manager::weights::{apply_kill_pairs, resolve, resolve_symbol};
use portfolio_manager::{AllocationConfig, SignalConditions};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn arb_conditions() -> impl Strategy<Value = SignalConditions> {
    (any::<bool>(), any::<bool>()).prop_map(|(b, f)| SignalConditions::new(b, f))
}

proptest! {
    /// Unpaired: one halving per active condition, never killed.
    #[test]
    fn unpaired_weight_is_base_times_halvings(base in 0.0..1.0_f64, c in arb_conditions()) {
        let w = resolve_symbol(base, c, false);
        let halvings = c.below_average as i32 + c.ma_falling as i32;
        prop_assert_eq!(w.weight, base * 0.5_f64.powi(halvings));
        prop_assert!(!w.kill_switch);
        if c.both() {
            prop_assert_eq!(w.weight, base * 0.25);
        }
    }

    /// Paired: both conditions force exactly zero.
    #[test]
    fn paired_double_strike_is_zero(base in 0.0..1.0_f64) {
        let w = resolve_symbol(base, SignalConditions::new(true, true), true);
        prop_assert_eq!(w.weight, 0.0);
        prop_assert!(w.kill_switch);
    }

    /// Running the pair pass again changes nothing.
    #[test]
    fn pair_pass_is_idempotent(
        tqqq in arb_conditions(),
        pfix in arb_conditions(),
        schd in arb_conditions(),
        tmf in arb_conditions(),
    ) {
        let config = AllocationConfig::default();
        let conditions: BTreeMap<String, SignalConditions> = [
            ("TQQQ", tqqq), ("PFIX", pfix), ("SCHD", schd), ("TMF", tmf),
        ]
        .into_iter()
        .map(|(s, c)| (s.to_string(), c))
        .collect();

        let mut weights = resolve(&config, &conditions);
        let once = weights.clone();
        apply_kill_pairs(&mut weights, config.kill_pairs());
        apply_kill_pairs(&mut weights, config.kill_pairs());
        prop_assert_eq!(&weights, &once);

        // A survivor doubles exactly once.
        if tmf.both() && !pfix.both() {
            prop_assert_eq!(weights["PFIX"].weight, weights["PFIX"].signal_weight * 2.0);
        }
        let total: f64 = weights.values().map(|w| w.weight).sum();
        prop_assert!(total <= 1.0 + 1e-9);
    }

    /// Floor sizing never spends more than the target value.
    #[test]
    fn floor_never_overspends(target in 0.0..1e7_f64, price in 0.01..5_000.0_f64) {
        let qty = target_quantity(target, price);
        prop_assert!(qty as f64 * price <= target + 1e-6);
        prop_assert!((qty + 1) as f64 * price > target - 1e-6);
    }
}
