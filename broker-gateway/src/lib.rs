//! Broker gateway implementations.
//!
//! * [`kis::KisClient`] talks to the KIS overseas-stock REST API.
//! * [`paper::PaperBroker`] simulates an account in memory.

pub mod kis;
pub mod paper;

pub use kis::{KisClient, KisConfig};
pub use paper::{PaperBroker, PaperSnapshot};
