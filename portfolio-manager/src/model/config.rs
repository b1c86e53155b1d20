use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use trading::{Venue, VenueBook};

/// Tolerance on the sum of base weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn default_tax_rate() -> f64 {
    0.22
}

fn default_ma_window() -> usize {
    strategy_lab::DEFAULT_WINDOW
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("No assets configured")]
    Empty,

    #[error("Duplicate asset {0}")]
    DuplicateAsset(String),

    #[error("Invalid base weight for {symbol}: {weight}")]
    InvalidWeight { symbol: String, weight: f64 },

    #[error("Base weights sum to {0}, expected 1.0")]
    WeightSum(f64),

    #[error("Kill-switch pair {0}/{1} is invalid: {2}")]
    InvalidPair(String, String, String),

    #[error("Tax rate {0} outside [0, 1]")]
    TaxRate(f64),

    #[error("Moving-average window must be at least 1")]
    Window,
}

/// One asset of the target allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    symbol: String,
    #[serde(default)]
    venue: Venue,
    /// Fraction of total equity before the trend rules apply.
    base_weight: f64,
}

impl AssetConfig {
    pub fn new(symbol: impl Into<String>, venue: Venue, base_weight: f64) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            venue,
            base_weight,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn base_weight(&self) -> f64 {
        self.base_weight
    }
}

/// Two mutually coupled hedges. Serialized as `["PFIX", "TMF"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchPair(String, String);

impl KillSwitchPair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(
            first.into().trim().to_uppercase(),
            second.into().trim().to_uppercase(),
        )
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.0 == symbol || self.1 == symbol
    }

    /// The other member of the pair, if `symbol` belongs to it.
    pub fn partner(&self, symbol: &str) -> Option<&str> {
        if self.0 == symbol {
            Some(&self.1)
        } else if self.1 == symbol {
            Some(&self.0)
        } else {
            None
        }
    }
}

/// Target allocation: asset set, base weights, kill-switch pairs and the
/// parameters of the trend rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    #[serde(default)]
    assets: Vec<AssetConfig>,
    #[serde(default)]
    kill_pairs: Vec<KillSwitchPair>,
    /// Flat rate applied to estimated realized gains. A placeholder, not a
    /// tax computation.
    #[serde(default = "default_tax_rate")]
    tax_rate: f64,
    #[serde(default = "default_ma_window")]
    ma_window: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            assets: vec![
                AssetConfig::new("TQQQ", Venue::Nasdaq, 0.50),
                AssetConfig::new("PFIX", Venue::Amex, 0.15),
                AssetConfig::new("SCHD", Venue::Amex, 0.20),
                AssetConfig::new("TMF", Venue::Amex, 0.15),
            ],
            kill_pairs: vec![KillSwitchPair::new("PFIX", "TMF")],
            tax_rate: default_tax_rate(),
            ma_window: default_ma_window(),
        }
    }
}

impl AllocationConfig {
    pub fn new(assets: Vec<AssetConfig>) -> Self {
        Self {
            assets,
            kill_pairs: Vec::new(),
            tax_rate: default_tax_rate(),
            ma_window: default_ma_window(),
        }
    }

    pub fn with_kill_pair(mut self, pair: KillSwitchPair) -> Self {
        self.kill_pairs.push(pair);
        self
    }

    pub fn with_tax_rate(mut self, tax_rate: f64) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    pub fn with_ma_window(mut self, ma_window: usize) -> Self {
        self.ma_window = ma_window;
        self
    }

    pub fn assets(&self) -> &[AssetConfig] {
        &self.assets
    }

    pub fn asset(&self, symbol: &str) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }

    pub fn kill_pairs(&self) -> &[KillSwitchPair] {
        &self.kill_pairs
    }

    /// The pair `symbol` belongs to, if any.
    pub fn pair_of(&self, symbol: &str) -> Option<&KillSwitchPair> {
        self.kill_pairs.iter().find(|p| p.contains(symbol))
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn ma_window(&self) -> usize {
        self.ma_window
    }

    pub fn venue_book(&self) -> VenueBook {
        self.assets
            .iter()
            .fold(VenueBook::new(), |book, a| book.with(a.symbol(), a.venue()))
    }

    /// Normalizes symbols (values loaded from a file bypass `new`) and checks
    /// the invariants the resolver relies on.
    pub fn validated(mut self) -> Result<Self, AllocationError> {
        for asset in &mut self.assets {
            asset.symbol = asset.symbol.trim().to_uppercase();
        }
        for pair in &mut self.kill_pairs {
            *pair = KillSwitchPair::new(pair.0.as_str(), pair.1.as_str());
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), AllocationError> {
        if self.assets.is_empty() {
            return Err(AllocationError::Empty);
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            if !seen.insert(asset.symbol.as_str()) {
                return Err(AllocationError::DuplicateAsset(asset.symbol.clone()));
            }
            if !asset.base_weight.is_finite() || asset.base_weight < 0.0 {
                return Err(AllocationError::InvalidWeight {
                    symbol: asset.symbol.clone(),
                    weight: asset.base_weight,
                });
            }
        }

        let sum: f64 = self.assets.iter().map(|a| a.base_weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AllocationError::WeightSum(sum));
        }

        let mut paired = HashSet::new();
        for pair in &self.kill_pairs {
            let invalid = |reason: &str| {
                AllocationError::InvalidPair(
                    pair.first().to_string(),
                    pair.second().to_string(),
                    reason.to_string(),
                )
            };
            if pair.first() == pair.second() {
                return Err(invalid("members must differ"));
            }
            for member in [pair.first(), pair.second()] {
                if !seen.contains(member) {
                    return Err(invalid("member is not a configured asset"));
                }
                if !paired.insert(member) {
                    return Err(invalid("member already belongs to another pair"));
                }
            }
        }

        if !(0.0..=1.0).contains(&self.tax_rate) {
            return Err(AllocationError::TaxRate(self.tax_rate));
        }
        if self.ma_window == 0 {
            return Err(AllocationError::Window);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allocation_is_valid() {
        let config = AllocationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.assets().len(), 4);
        assert_eq!(config.tax_rate(), 0.22);
        assert_eq!(config.ma_window(), 130);
        assert_eq!(config.pair_of("TMF").unwrap().partner("TMF"), Some("PFIX"));
        assert!(config.pair_of("TQQQ").is_none());
        assert_eq!(config.venue_book().venue_of("schd"), Venue::Amex);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let config = AllocationConfig::new(vec![
            AssetConfig::new("AAA", Venue::Nasdaq, 0.6),
            AssetConfig::new("BBB", Venue::Nyse, 0.3),
        ]);
        assert!(matches!(
            config.validate(),
            Err(AllocationError::WeightSum(_))
        ));
    }

    #[test]
    fn pair_members_must_be_configured() {
        let config = AllocationConfig::new(vec![AssetConfig::new("AAA", Venue::Nasdaq, 1.0)])
            .with_kill_pair(KillSwitchPair::new("AAA", "ZZZ"));
        assert!(matches!(
            config.validate(),
            Err(AllocationError::InvalidPair(..))
        ));
    }

    #[test]
    fn loaded_symbols_are_normalized() {
        let json = r#"{
            "assets": [
                {"symbol": " tqqq ", "base_weight": 0.5},
                {"symbol": "tmf", "venue": "amex", "base_weight": 0.5}
            ],
            "kill_pairs": [["tqqq", "TMF"]]
        }"#;
        let config: AllocationConfig = serde_json::from_str(json).unwrap();
        let config = config.validated().unwrap();
        assert_eq!(config.assets()[0].symbol(), "TQQQ");
        assert_eq!(config.assets()[0].venue(), Venue::Nasdaq);
        assert_eq!(config.kill_pairs()[0].first(), "TQQQ");
        assert_eq!(config.tax_rate(), 0.22);
    }
}
