//! User-editable strategy settings.

use crate::error::EngineError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

fn default_principal() -> f64 {
    10_000.0
}

fn default_split_count() -> u32 {
    40
}

fn default_target_rate() -> f64 {
    0.10
}

fn default_symbols() -> BTreeSet<String> {
    BTreeSet::from(["TQQQ".to_string()])
}

/// Singleton settings row driving the daily accumulation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Total capital dedicated to one cycle.
    #[serde(default = "default_principal")]
    pub principal: f64,
    /// Number of daily slices the principal is divided into.
    #[serde(default = "default_split_count")]
    pub split_count: u32,
    /// Fractional profit target of the paired sell (0.10 = +10%).
    #[serde(default = "default_target_rate")]
    pub target_rate: f64,
    /// Tickers accumulated by the daily run. Accepts a list or a
    /// comma-separated string.
    #[serde(
        default = "default_symbols",
        deserialize_with = "deserialize_symbols"
    )]
    pub symbols: BTreeSet<String>,
    /// Master switch. Inactive settings make the daily run a no-op.
    #[serde(default)]
    pub is_active: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            principal: default_principal(),
            split_count: default_split_count(),
            target_rate: default_target_rate(),
            symbols: default_symbols(),
            is_active: false,
        }
    }
}

impl Settings {
    /// Amount of cash committed by one daily buy.
    pub fn unit_amount(&self) -> f64 {
        self.principal / f64::from(self.split_count.max(1))
    }

    /// Comma-separated form used by the SQL store.
    pub fn symbols_csv(&self) -> String {
        self.symbols.iter().cloned().collect::<Vec<_>>().join(",")
    }

    pub fn set_symbols_csv(&mut self, csv: &str) {
        self.symbols = parse_symbols(csv);
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.principal.is_finite() || self.principal < 0.0 {
            return Err(EngineError::InvalidSettings(format!(
                "principal must be >= 0, got {}",
                self.principal
            )));
        }
        if self.split_count < 1 {
            return Err(EngineError::InvalidSettings(
                "split_count must be >= 1".into(),
            ));
        }
        if !self.target_rate.is_finite() || self.target_rate < 0.0 {
            return Err(EngineError::InvalidSettings(format!(
                "target_rate must be >= 0, got {}",
                self.target_rate
            )));
        }
        if self.symbols.is_empty() {
            return Err(EngineError::InvalidSettings(
                "at least one symbol is required".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn parse_symbols(csv: &str) -> BTreeSet<String> {
    csv.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn deserialize_symbols<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Symbols {
        Csv(String),
        List(Vec<String>),
    }

    Ok(match Symbols::deserialize(deserializer)? {
        Symbols::Csv(csv) => parse_symbols(&csv),
        Symbols::List(list) => parse_symbols(&list.join(",")),
    })
}
