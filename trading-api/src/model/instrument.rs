//! Defines the data models for tradable instruments.
//!
//! An `Instrument` is a ticker plus the `Venue` it trades on. The broker uses
//! different exchange codes for quotes and for orders, so the venue carries both.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// US listing venue of an instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    #[default]
    Nasdaq,
    Nyse,
    Amex,
}

impl Venue {
    /// Exchange code used by quotation endpoints (e.g. "NAS").
    pub fn quote_code(&self) -> &'static str {
        match self {
            Venue::Nasdaq => "NAS",
            Venue::Nyse => "NYS",
            Venue::Amex => "AMS",
        }
    }

    /// Exchange code used by trading endpoints (e.g. "NASD").
    pub fn order_code(&self) -> &'static str {
        match self {
            Venue::Nasdaq => "NASD",
            Venue::Nyse => "NYSE",
            Venue::Amex => "AMEX",
        }
    }
}

impl FromStr for Venue {
    type Err = String;

    /// Accepts the venue name or either exchange code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NASDAQ" | "NAS" | "NASD" => Ok(Venue::Nasdaq),
            "NYSE" | "NYS" => Ok(Venue::Nyse),
            "AMEX" | "AMS" => Ok(Venue::Amex),
            other => Err(format!("unknown venue '{}'", other)),
        }
    }
}

/// Represents a listed equity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// The human-readable ticker symbol (e.g., "TQQQ").
    symbol: String,

    /// The venue where this instrument trades.
    venue: Venue,
}

impl Instrument {
    /// Creates a new Instrument.
    ///
    /// # Arguments
    ///
    /// * `symbol` - Ticker, normalized to uppercase.
    /// * `venue` - The listing venue.
    pub fn new(symbol: impl Into<String>, venue: Venue) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            venue,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue.quote_code(), self.symbol)
    }
}

/// Lookup table from ticker to venue.
///
/// Symbols that were never registered resolve to the default venue (Nasdaq).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueBook {
    venues: HashMap<String, Venue>,
}

impl VenueBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, venue: Venue) {
        self.venues
            .insert(symbol.into().trim().to_uppercase(), venue);
    }

    pub fn with(mut self, symbol: impl Into<String>, venue: Venue) -> Self {
        self.insert(symbol, venue);
        self
    }

    pub fn venue_of(&self, symbol: &str) -> Venue {
        self.venues
            .get(&symbol.trim().to_uppercase())
            .copied()
            .unwrap_or_default()
    }

    /// Resolves a ticker into a full `Instrument`.
    pub fn resolve(&self, symbol: &str) -> Instrument {
        Instrument::new(symbol, self.venue_of(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_codes_differ_between_quotes_and_orders() {
        assert_eq!(Venue::Amex.quote_code(), "AMS");
        assert_eq!(Venue::Amex.order_code(), "AMEX");
        assert_eq!(Venue::Nasdaq.quote_code(), "NAS");
        assert_eq!(Venue::Nasdaq.order_code(), "NASD");
    }

    #[test]
    fn venue_parses_names_and_codes() {
        assert_eq!("ams".parse::<Venue>(), Ok(Venue::Amex));
        assert_eq!("NASD".parse::<Venue>(), Ok(Venue::Nasdaq));
        assert_eq!(" nyse ".parse::<Venue>(), Ok(Venue::Nyse));
        assert!("LSE".parse::<Venue>().is_err());
    }

    #[test]
    fn unknown_symbols_fall_back_to_nasdaq() {
        let book = VenueBook::new().with("tmf", Venue::Amex);
        assert_eq!(book.resolve("TMF").venue(), Venue::Amex);
        assert_eq!(book.resolve(" soxl ").venue(), Venue::Nasdaq);
        assert_eq!(book.resolve(" soxl ").symbol(), "SOXL");
    }
}
