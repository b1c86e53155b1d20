//! Daemon configuration.
//!
//! Layers, lowest priority first: `config/trader.toml` (optional), the file
//! passed with `--config`, then `TRADER__<SECTION>__<KEY>` environment
//! variables.

use anyhow::{anyhow, bail, Context, Result};
use broker_gateway::KisConfig;
use chrono::NaiveTime;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use portfolio_manager::AllocationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config/trader";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// `HH:MM` in `timezone` at which both jobs fire.
    pub time: String,
    /// IANA zone of the exchange clock.
    pub timezone: String,
    /// Day of month of the rebalance. Months without that day are skipped.
    pub rebalance_day: u32,
    pub daily_enabled: bool,
    pub rebalance_enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time: "15:50".to_string(),
            timezone: "America/New_York".to_string(),
            rebalance_day: 26,
            daily_enabled: true,
            rebalance_enabled: true,
        }
    }
}

impl ScheduleConfig {
    pub fn fire_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .with_context(|| format!("schedule.time must be HH:MM, got '{}'", self.time))
    }

    pub fn zone(&self) -> Result<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow!("schedule.timezone '{}': {}", self.timezone, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/trader.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerMode {
    #[default]
    Kis,
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub mode: BrokerMode,
    pub kis: KisConfig,
    /// JSON seed of the paper broker.
    pub paper_snapshot: Option<PathBuf>,
    /// Starting cash of the paper broker when no snapshot is given.
    pub paper_cash: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mode: BrokerMode::Kis,
            kis: KisConfig::default(),
            paper_snapshot: None,
            paper_cash: 100_000.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub allocation: AllocationConfig,
}

impl SystemConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("TRADER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: SystemConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.apply_kis_env();
        config.finish()
    }

    /// Credentials may also come from the `KIS_*` variables the gateway CLI
    /// reads. Values set in the config layers win.
    fn apply_kis_env(&mut self) {
        let kis = &mut self.broker.kis;
        for (var, field) in [
            ("KIS_APP_KEY", &mut kis.app_key),
            ("KIS_APP_SECRET", &mut kis.app_secret),
            ("KIS_ACCOUNT_NUM", &mut kis.account),
        ] {
            if field.is_empty() {
                if let Ok(value) = std::env::var(var) {
                    *field = value;
                }
            }
        }
    }

    /// Normalizes and checks the loaded values.
    pub fn finish(mut self) -> Result<Self> {
        self.schedule.fire_time()?;
        self.schedule.zone()?;
        if !(1..=31).contains(&self.schedule.rebalance_day) {
            bail!(
                "schedule.rebalance_day must be within 1..=31, got {}",
                self.schedule.rebalance_day
            );
        }
        self.allocation = self
            .allocation
            .validated()
            .context("Invalid allocation")?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use trading::Venue;

    fn from_toml(text: &str) -> Result<SystemConfig> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        file.write_all(text.as_bytes())?;
        SystemConfig::load(Some(file.path()))
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = from_toml("[server]\nport = 9090\n").unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.schedule.time, "15:50");
        assert_eq!(config.schedule.rebalance_day, 26);
        assert_eq!(config.schedule.zone().unwrap(), chrono_tz::America::New_York);
        assert_eq!(config.database.path, PathBuf::from("data/trader.sqlite"));
        assert_eq!(config.broker.mode, BrokerMode::Kis);
        assert_eq!(config.allocation.assets().len(), 4);
        assert_eq!(config.allocation.tax_rate(), 0.22);
    }

    #[test]
    fn allocation_and_broker_sections_parse() {
        let config = from_toml(
            r#"
            [broker]
            mode = "paper"
            paper_cash = 2500.0

            [allocation]
            tax_rate = 0.15
            kill_pairs = [["tlt", "tmf"]]

            [[allocation.assets]]
            symbol = "qqq"
            base_weight = 0.6

            [[allocation.assets]]
            symbol = "TLT"
            venue = "nyse"
            base_weight = 0.2

            [[allocation.assets]]
            symbol = "TMF"
            venue = "amex"
            base_weight = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.mode, BrokerMode::Paper);
        assert_eq!(config.broker.paper_cash, 2500.0);
        assert_eq!(config.allocation.tax_rate(), 0.15);
        let qqq = config.allocation.asset("QQQ").unwrap();
        assert_eq!(qqq.venue(), Venue::Nasdaq);
        assert!(config.allocation.pair_of("TMF").is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(from_toml("[schedule]\ntime = \"25:99\"\n").is_err());
        assert!(from_toml("[schedule]\nrebalance_day = 0\n").is_err());
        assert!(from_toml("[schedule]\ntimezone = \"Mars/Olympus\"\n").is_err());
        let bad_weights = r#"
            [[allocation.assets]]
            symbol = "QQQ"
            base_weight = 0.7
        "#;
        assert!(from_toml(bad_weights).is_err());
    }
}
