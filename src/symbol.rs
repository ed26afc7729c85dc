use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A canonical `BASE/QUOTE` trading pair, e.g. `BTC/USDT`.
///
/// Venue adapters translate to and from their own wire forms (concatenated
/// for Binance-style venues, dash-separated for OKX-style venues); this is
/// the only form the cache, engine and executors ever see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    base: String,
    quote: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolParseError {
    #[error("symbol {0:?} is missing a '/' separator")]
    MissingSeparator(String),
    #[error("symbol {0:?} has an invalid base or quote segment")]
    InvalidSegment(String),
}

fn is_valid_segment(s: &str) -> bool {
    (2..=10).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_lowercase())
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self, SymbolParseError> {
        let base = base.into();
        let quote = quote.into();
        if !is_valid_segment(&base) || !is_valid_segment(&quote) {
            return Err(SymbolParseError::InvalidSegment(format!("{base}/{quote}")));
        }
        Ok(Self { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl FromStr for Symbol {
    type Err = SymbolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| SymbolParseError::MissingSeparator(s.to_string()))?;
        Symbol::new(base, quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        let sym: Symbol = "BTC/USDT".parse().unwrap();
        assert_eq!(sym.base(), "BTC");
        assert_eq!(sym.quote(), "USDT");
        assert_eq!(sym.to_string(), "BTC/USDT");
    }

    #[test]
    fn rejects_missing_separator() {
        assert!("BTCUSDT".parse::<Symbol>().is_err());
    }

    #[test]
    fn rejects_lowercase() {
        assert!("btc/usdt".parse::<Symbol>().is_err());
    }

    #[test]
    fn rejects_too_short_segment() {
        assert!("B/USDT".parse::<Symbol>().is_err());
    }
}
