pub mod cycle;
pub mod holding;
pub mod instrument;
pub mod order;
pub mod plan;
pub mod settings;
pub mod trade_log;
