//! Reconciliation of cycle state against the broker's holdings.
//!
//! The sync always wins over the optimistic writes made by the daily run.

use super::Engine;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use trading::{CycleStatus, EngineError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Rows overwritten from the snapshot.
    pub updated: usize,
    /// Rows whose cycle restarted because the position is gone.
    pub reset: usize,
}

impl Engine {
    /// Overwrites every `CycleStatus` row with the broker's holdings.
    ///
    /// Rows of symbols absent from the snapshot are zeroed as if the
    /// broker had reported a quantity of 0.
    pub fn sync_cycle_state(&self) -> Result<SyncReport, EngineError> {
        let snapshot = self.broker.balance()?;
        let mut report = SyncReport::default();
        let mut seen = BTreeSet::new();

        for holding in snapshot.holdings() {
            let symbol = holding.symbol.trim().to_uppercase();
            let mut status = self
                .store
                .cycle_status(&symbol)?
                .unwrap_or_else(|| CycleStatus::new(symbol.as_str()));
            let was_running = !status.is_fresh();
            status.overwrite_from_broker(holding.quantity, holding.avg_price);
            if was_running && status.is_fresh() {
                report.reset += 1;
            }
            self.store.upsert_cycle_status(&status)?;
            report.updated += 1;
            seen.insert(symbol);
        }

        for mut status in self.store.cycle_statuses()? {
            if seen.contains(&status.symbol) {
                continue;
            }
            if status.is_fresh() && status.total_bought_qty == 0 {
                continue;
            }
            warn!(
                "{} missing from broker holdings; closing its cycle at day {}",
                status.symbol, status.current_cycle_day
            );
            status.overwrite_from_broker(0, 0.0);
            self.store.upsert_cycle_status(&status)?;
            report.updated += 1;
            report.reset += 1;
        }

        info!(
            "Sync complete: {} rows updated, {} cycles reset",
            report.updated, report.reset
        );
        Ok(report)
    }
}
