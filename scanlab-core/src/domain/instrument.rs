//! Instrument identity: raw exchange symbol plus its canonical base asset.

use serde::{Deserialize, Serialize};

/// Quote currencies stripped when deriving a base asset, longest first.
const QUOTE_SUFFIXES: [&str; 7] = ["FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USD", "PERP"];

/// Instrument identity carried on every signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Raw symbol as the candle source names it (e.g. "BTCUSDT").
    pub symbol: String,
    /// Canonical base asset (e.g. "BTC").
    pub base_asset: String,
    /// Source / exchange label.
    pub exchange: String,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let base_asset = base_asset_of(&symbol);
        Self {
            symbol,
            base_asset,
            exchange: exchange.into(),
        }
    }
}

/// Derive the base asset from a raw symbol.
///
/// Handles separated forms ("BTC/USDT:USDT", "ETH-PERP", "SOL_USDC"), glued
/// forms ("BTCUSDT") and the "1000" contract multiplier prefix ("1000PEPEUSDT").
pub fn base_asset_of(symbol: &str) -> String {
    let upper = symbol.trim().to_ascii_uppercase();

    let head = upper
        .split(|c| matches!(c, '/' | '-' | '_' | ':'))
        .next()
        .unwrap_or("")
        .to_string();

    let mut base = if head.len() < upper.len() {
        head
    } else {
        let mut stripped = upper.clone();
        for suffix in QUOTE_SUFFIXES {
            if stripped.len() > suffix.len() && stripped.ends_with(suffix) {
                stripped.truncate(stripped.len() - suffix.len());
                break;
            }
        }
        stripped
    };

    if let Some(rest) = base.strip_prefix("1000") {
        if !rest.is_empty() {
            base = rest.to_string();
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glued_symbols() {
        assert_eq!(base_asset_of("BTCUSDT"), "BTC");
        assert_eq!(base_asset_of("ethusdc"), "ETH");
        assert_eq!(base_asset_of("SOLFDUSD"), "SOL");
    }

    #[test]
    fn separated_symbols() {
        assert_eq!(base_asset_of("BTC/USDT:USDT"), "BTC");
        assert_eq!(base_asset_of("ETH-PERP"), "ETH");
        assert_eq!(base_asset_of("DOGE_USDT"), "DOGE");
    }

    #[test]
    fn multiplier_prefix_removed() {
        assert_eq!(base_asset_of("1000PEPEUSDT"), "PEPE");
    }

    #[test]
    fn bare_quote_is_kept() {
        assert_eq!(base_asset_of("USDT"), "USDT");
    }

    #[test]
    fn instrument_new_fills_base() {
        let i = Instrument::new("XRPUSDT", "binance");
        assert_eq!(i.base_asset, "XRP");
        assert_eq!(i.exchange, "binance");
    }
}
