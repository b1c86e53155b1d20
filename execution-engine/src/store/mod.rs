//! `Store` implementations.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use trading::{
        CycleStatus, Instrument, OrderRequest, OrderSide, Settings, Store, TradeLog, TradeOrigin,
        TradeQuery, Venue,
    };

    /// Both stores must agree on the same sequence of calls.
    fn exercise(store: &dyn Store) {
        assert!(store.load_settings().unwrap().is_none());
        store.save_settings(&Settings::default()).unwrap();
        assert_eq!(store.load_settings().unwrap(), Some(Settings::default()));

        let mut status = CycleStatus::new("TQQQ");
        status.overwrite_from_broker(3, 10.0);
        store.upsert_cycle_status(&status).unwrap();
        assert_eq!(store.cycle_status("TQQQ").unwrap(), Some(status));

        let when = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(15, 50, 0)
            .unwrap();
        let later = when + chrono::Duration::minutes(1);
        let order = OrderRequest::limit(Instrument::new("TQQQ", Venue::Nasdaq), OrderSide::Buy, 2, 10.0);
        let id2 = store
            .append_trade(&TradeLog::from_order(&order, TradeOrigin::Daily, later, 0.0))
            .unwrap();
        let id1 = store
            .append_trade(&TradeLog::from_order(&order, TradeOrigin::Daily, when, 0.0))
            .unwrap();
        assert_ne!(id1, id2);

        let rows = store.trades(&TradeQuery::new().symbol("TQQQ")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].executed_at, when);
        assert_eq!(rows[1].id, Some(id2));
    }

    #[test]
    fn memory_store_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn sqlite_store_contract() {
        exercise(&SqliteStore::open_in_memory().unwrap());
    }
}
