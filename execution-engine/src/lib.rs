pub mod clock;
pub mod engine;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::accumulation::{
    buy_quantity, paired_sell, DailyExecution, DailyReport, LegOutcome, PairedSell, SymbolOutcome,
};
pub use engine::orchestrator::{ExecutionReport, ItemOutcome, ItemStatus};
pub use engine::sync::SyncReport;
pub use engine::Engine;
pub use store::{MemoryStore, SqliteStore};
