//! Trade outcomes produced by the backtest simulator.

use serde::{Deserialize, Serialize};

use super::signal::{Setup, Side, StrategyKind};

/// Classification of a simulated trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeResult {
    Win,
    Loss,
    Expired,
}

/// Result of forward-walking one setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub result: TradeResult,
    /// Signed return of the trade relative to the fill price.
    pub realized_pnl_fraction: f64,
    /// Candles walked after the signal candle until the trade resolved.
    pub candles_to_resolution: usize,
    pub was_time_exit: bool,
    pub was_never_filled: bool,
    /// True when confirm-on-close rejected the touching candle.
    pub fill_invalidated: bool,
    pub fill_price: Option<f64>,
    pub exit_price: Option<f64>,
}

impl TradeOutcome {
    /// Entry never executed: EXPIRED with zero PnL.
    pub fn never_filled(candles_walked: usize, invalidated: bool) -> Self {
        Self {
            result: TradeResult::Expired,
            realized_pnl_fraction: 0.0,
            candles_to_resolution: candles_walked,
            was_time_exit: false,
            was_never_filled: true,
            fill_invalidated: invalidated,
            fill_price: None,
            exit_price: None,
        }
    }
}

/// One simulated trade with the signal that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub strategy: StrategyKind,
    /// Open time (epoch ms) of the candle the signal was generated on.
    pub signal_time: i64,
    pub candle_index: usize,
    pub score: f64,
    pub side: Side,
    pub setup: Setup,
    pub outcome: TradeOutcome,
}
