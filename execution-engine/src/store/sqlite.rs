//! SQLite-backed store.

use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use trading::{
    CycleStatus, OrderSide, OrderType, Settings, Store, StoreError, TradeLog, TradeOrigin,
    TradeQuery,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    principal   REAL    NOT NULL,
    split_count INTEGER NOT NULL,
    target_rate REAL    NOT NULL,
    symbols     TEXT    NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS cycle_status (
    symbol            TEXT PRIMARY KEY,
    current_cycle_day INTEGER NOT NULL DEFAULT 0,
    total_bought_qty  INTEGER NOT NULL DEFAULT 0,
    avg_price         REAL    NOT NULL DEFAULT 0,
    total_invested    REAL    NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS trade_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    date        TEXT    NOT NULL,
    executed_at TEXT    NOT NULL,
    symbol      TEXT    NOT NULL,
    side        TEXT    NOT NULL,
    order_type  TEXT    NOT NULL DEFAULT 'LIMIT',
    origin      TEXT    NOT NULL DEFAULT 'DAILY',
    qty         INTEGER NOT NULL,
    price       REAL    NOT NULL,
    amount      REAL    NOT NULL,
    profit      REAL    NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_trade_log_lookup ON trade_log(symbol, side, date);
"#;

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn corrupt(table: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table: table.to_string(),
        reason: reason.into(),
    }
}

fn to_u64(table: &str, column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| corrupt(table, format!("negative {}: {}", column, value)))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("{} overflows INTEGER", value)))
}

/// Columns of a `trade_log` row before enum decoding.
struct RawTrade {
    id: i64,
    date: NaiveDate,
    executed_at: NaiveDateTime,
    symbol: String,
    side: String,
    order_type: String,
    origin: String,
    qty: i64,
    price: f64,
    amount: f64,
    profit: f64,
}

impl RawTrade {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            executed_at: row.get(2)?,
            symbol: row.get(3)?,
            side: row.get(4)?,
            order_type: row.get(5)?,
            origin: row.get(6)?,
            qty: row.get(7)?,
            price: row.get(8)?,
            amount: row.get(9)?,
            profit: row.get(10)?,
        })
    }

    fn decode(self) -> Result<TradeLog, StoreError> {
        Ok(TradeLog {
            id: Some(self.id),
            date: self.date,
            executed_at: self.executed_at,
            side: self.side.parse::<OrderSide>().map_err(|e| corrupt("trade_log", e))?,
            order_type: self
                .order_type
                .parse::<OrderType>()
                .map_err(|e| corrupt("trade_log", e))?,
            origin: self
                .origin
                .parse::<TradeOrigin>()
                .map_err(|e| corrupt("trade_log", e))?,
            qty: to_u64("trade_log", "qty", self.qty)?,
            symbol: self.symbol,
            price: self.price,
            amount: self.amount,
            profit: self.profit,
        })
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database file and its schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        info!("Opened database {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn cycle_from_row(row: &Row<'_>) -> rusqlite::Result<(String, u32, i64, f64, f64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_cycle(raw: (String, u32, i64, f64, f64)) -> Result<CycleStatus, StoreError> {
    let (symbol, day, qty, avg_price, total_invested) = raw;
    Ok(CycleStatus {
        symbol,
        current_cycle_day: day,
        total_bought_qty: to_u64("cycle_status", "total_bought_qty", qty)?,
        avg_price,
        total_invested,
    })
}

impl Store for SqliteStore {
    fn load_settings(&self) -> Result<Option<Settings>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT principal, split_count, target_rate, symbols, is_active
                 FROM settings WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(backend)?;

        Ok(row.map(|(principal, split_count, target_rate, symbols, is_active)| {
            let mut settings = Settings {
                principal,
                split_count,
                target_rate,
                is_active,
                ..Default::default()
            };
            settings.set_symbols_csv(&symbols);
            settings
        }))
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.conn()?
            .execute(
                "INSERT INTO settings (id, principal, split_count, target_rate, symbols, is_active)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    principal = excluded.principal,
                    split_count = excluded.split_count,
                    target_rate = excluded.target_rate,
                    symbols = excluded.symbols,
                    is_active = excluded.is_active",
                params![
                    settings.principal,
                    settings.split_count,
                    settings.target_rate,
                    settings.symbols_csv(),
                    settings.is_active
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn cycle_status(&self, symbol: &str) -> Result<Option<CycleStatus>, StoreError> {
        let raw = self
            .conn()?
            .query_row(
                "SELECT symbol, current_cycle_day, total_bought_qty, avg_price, total_invested
                 FROM cycle_status WHERE symbol = ?1",
                params![symbol],
                cycle_from_row,
            )
            .optional()
            .map_err(backend)?;
        raw.map(decode_cycle).transpose()
    }

    fn cycle_statuses(&self) -> Result<Vec<CycleStatus>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, current_cycle_day, total_bought_qty, avg_price, total_invested
                 FROM cycle_status ORDER BY symbol",
            )
            .map_err(backend)?;
        let raws = stmt
            .query_map([], cycle_from_row)
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        raws.into_iter().map(decode_cycle).collect()
    }

    fn upsert_cycle_status(&self, status: &CycleStatus) -> Result<(), StoreError> {
        self.conn()?
            .execute(
                "INSERT INTO cycle_status
                    (symbol, current_cycle_day, total_bought_qty, avg_price, total_invested)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(symbol) DO UPDATE SET
                    current_cycle_day = excluded.current_cycle_day,
                    total_bought_qty = excluded.total_bought_qty,
                    avg_price = excluded.avg_price,
                    total_invested = excluded.total_invested",
                params![
                    status.symbol,
                    status.current_cycle_day,
                    to_i64(status.total_bought_qty)?,
                    status.avg_price,
                    status.total_invested
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn append_trade(&self, trade: &TradeLog) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trade_log
                (date, executed_at, symbol, side, order_type, origin, qty, price, amount, profit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                trade.date,
                trade.executed_at,
                trade.symbol,
                trade.side.as_str(),
                trade.order_type.as_str(),
                trade.origin.as_str(),
                to_i64(trade.qty)?,
                trade.price,
                trade.amount,
                trade.profit
            ],
        )
        .map_err(backend)?;
        Ok(conn.last_insert_rowid())
    }

    fn trades(&self, query: &TradeQuery) -> Result<Vec<TradeLog>, StoreError> {
        let mut sql = String::from(
            "SELECT id, date, executed_at, symbol, side, order_type, origin, qty, price, amount, profit
             FROM trade_log WHERE 1 = 1",
        );
        let mut args: Vec<Value> = Vec::new();
        if let Some(symbol) = &query.symbol {
            sql.push_str(" AND symbol = ?");
            args.push(Value::Text(symbol.clone()));
        }
        if let Some(side) = query.side {
            sql.push_str(" AND side = ?");
            args.push(Value::Text(side.as_str().to_string()));
        }
        if let Some(origin) = query.origin {
            sql.push_str(" AND origin = ?");
            args.push(Value::Text(origin.as_str().to_string()));
        }
        if let Some(from) = query.from {
            sql.push_str(" AND date >= ?");
            args.push(Value::Text(from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = query.to {
            sql.push_str(" AND date <= ?");
            args.push(Value::Text(to.format("%Y-%m-%d").to_string()));
        }
        sql.push_str(" ORDER BY executed_at, id");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let raws = stmt
            .query_map(params_from_iter(args), RawTrade::from_row)
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        raws.into_iter().map(RawTrade::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::{Instrument, OrderRequest, Venue};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 50, 0)
            .unwrap()
    }

    fn trade(symbol: &str, side: OrderSide, origin: TradeOrigin, when: NaiveDateTime) -> TradeLog {
        let order = OrderRequest::limit(Instrument::new(symbol, Venue::Nasdaq), side, 5, 50.0);
        TradeLog::from_order(&order, origin, when, 12.5)
    }

    #[test]
    fn settings_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/trader.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.load_settings().unwrap(), None);
            let mut settings = Settings::default();
            settings.set_symbols_csv("tqqq, soxl");
            settings.is_active = true;
            store.save_settings(&settings).unwrap();
            settings.principal = 20_000.0;
            store.save_settings(&settings).unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        let settings = reopened.load_settings().unwrap().unwrap();
        assert_eq!(settings.principal, 20_000.0);
        assert!(settings.is_active);
        assert_eq!(settings.symbols_csv(), "SOXL,TQQQ");
    }

    #[test]
    fn cycle_status_upserts_by_symbol() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut status = CycleStatus::new("TQQQ");
        status.overwrite_from_broker(10, 48.0);
        store.upsert_cycle_status(&status).unwrap();
        status.advance_day();
        store.upsert_cycle_status(&status).unwrap();
        store.upsert_cycle_status(&CycleStatus::new("SOXL")).unwrap();

        assert_eq!(store.cycle_status("TQQQ").unwrap(), Some(status));
        assert_eq!(store.cycle_status("TMF").unwrap(), None);
        let symbols: Vec<String> = store
            .cycle_statuses()
            .unwrap()
            .into_iter()
            .map(|c| c.symbol)
            .collect();
        assert_eq!(symbols, vec!["SOXL", "TQQQ"]);
    }

    #[test]
    fn trade_queries_filter_by_symbol_side_and_dates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store
            .append_trade(&trade("TQQQ", OrderSide::Buy, TradeOrigin::Daily, at(1, 15)))
            .unwrap();
        store
            .append_trade(&trade("TQQQ", OrderSide::Sell, TradeOrigin::Daily, at(1, 15)))
            .unwrap();
        store
            .append_trade(&trade("TQQQ", OrderSide::Buy, TradeOrigin::Rebalance, at(2, 15)))
            .unwrap();
        store
            .append_trade(&trade("TMF", OrderSide::Buy, TradeOrigin::Daily, at(3, 9)))
            .unwrap();

        let daily_buys = store
            .trades(
                &TradeQuery::new()
                    .symbol("TQQQ")
                    .side(OrderSide::Buy)
                    .origin(TradeOrigin::Daily)
                    .on(at(1, 0).date()),
            )
            .unwrap();
        assert_eq!(daily_buys.len(), 1);
        assert_eq!(daily_buys[0].id, Some(first));
        assert_eq!(daily_buys[0].profit, 0.0);
        assert_eq!(daily_buys[0].executed_at, at(1, 15));

        let range = store
            .trades(&TradeQuery::new().between(at(2, 0).date(), at(3, 0).date()))
            .unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].origin, TradeOrigin::Rebalance);
        assert_eq!(range[1].symbol, "TMF");

        let sells = store.trades(&TradeQuery::new().side(OrderSide::Sell)).unwrap();
        assert_eq!(sells[0].profit, 12.5);
        assert_eq!(store.trades(&TradeQuery::new()).unwrap().len(), 4);
    }
}
