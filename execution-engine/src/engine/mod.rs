//! The decision engine facade.
//!
//! `Engine` owns the broker, the store and the clock, and exposes every
//! operation the outer layers call. None of them are safe to run
//! concurrently with themselves; callers serialize the accumulation path
//! (daily run, sync) and the rebalance path.

pub mod accumulation;
pub mod orchestrator;
pub mod sync;

use crate::clock::{Clock, SystemClock};
use log::info;
use portfolio_manager::RebalancePlanner;
use std::sync::Arc;
use trading::{
    BrokerGateway, CycleStatus, EngineError, RebalancePlan, Settings, Store, TradeLog, TradeQuery,
};

pub struct Engine {
    broker: Arc<dyn BrokerGateway>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    planner: RebalancePlanner,
}

impl Engine {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        store: Arc<dyn Store>,
        planner: RebalancePlanner,
    ) -> Self {
        Self {
            broker,
            store,
            clock: Arc::new(SystemClock),
            planner,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn broker(&self) -> &dyn BrokerGateway {
        self.broker.as_ref()
    }

    pub fn planner(&self) -> &RebalancePlanner {
        &self.planner
    }

    /// Current settings. A first call persists the defaults.
    pub fn settings(&self) -> Result<Settings, EngineError> {
        if let Some(settings) = self.store.load_settings()? {
            return Ok(settings);
        }
        let settings = Settings::default();
        self.store.save_settings(&settings)?;
        info!("Created default settings ({})", settings.symbols_csv());
        Ok(settings)
    }

    pub fn update_settings(&self, mut settings: Settings) -> Result<Settings, EngineError> {
        let csv = settings.symbols_csv();
        settings.set_symbols_csv(&csv);
        settings.validate()?;
        self.store.save_settings(&settings)?;
        info!(
            "Settings updated: principal={:.2} split={} target={:.3} symbols={} active={}",
            settings.principal,
            settings.split_count,
            settings.target_rate,
            settings.symbols_csv(),
            settings.is_active
        );
        Ok(settings)
    }

    /// Every cycle row, ordered by symbol.
    pub fn dashboard(&self) -> Result<Vec<CycleStatus>, EngineError> {
        Ok(self.store.cycle_statuses()?)
    }

    pub fn trades(&self, query: &TradeQuery) -> Result<Vec<TradeLog>, EngineError> {
        Ok(self.store.trades(query)?)
    }

    pub fn compute_plan(&self) -> Result<RebalancePlan, EngineError> {
        self.planner.compute_plan(self.broker.as_ref())
    }
}
