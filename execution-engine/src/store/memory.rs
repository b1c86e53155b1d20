use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use trading::{CycleStatus, Settings, Store, StoreError, TradeLog, TradeQuery};

#[derive(Debug, Default)]
struct Tables {
    settings: Option<Settings>,
    cycles: BTreeMap<String, CycleStatus>,
    trades: Vec<TradeLog>,
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn load_settings(&self) -> Result<Option<Settings>, StoreError> {
        Ok(self.lock()?.settings.clone())
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.lock()?.settings = Some(settings.clone());
        Ok(())
    }

    fn cycle_status(&self, symbol: &str) -> Result<Option<CycleStatus>, StoreError> {
        Ok(self.lock()?.cycles.get(symbol).cloned())
    }

    fn cycle_statuses(&self) -> Result<Vec<CycleStatus>, StoreError> {
        Ok(self.lock()?.cycles.values().cloned().collect())
    }

    fn upsert_cycle_status(&self, status: &CycleStatus) -> Result<(), StoreError> {
        self.lock()?
            .cycles
            .insert(status.symbol.clone(), status.clone());
        Ok(())
    }

    fn append_trade(&self, trade: &TradeLog) -> Result<i64, StoreError> {
        let mut tables = self.lock()?;
        let id = tables.trades.len() as i64 + 1;
        let mut row = trade.clone();
        row.id = Some(id);
        tables.trades.push(row);
        Ok(id)
    }

    fn trades(&self, query: &TradeQuery) -> Result<Vec<TradeLog>, StoreError> {
        let tables = self.lock()?;
        let mut rows: Vec<TradeLog> = tables
            .trades
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.executed_at.cmp(&b.executed_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}
