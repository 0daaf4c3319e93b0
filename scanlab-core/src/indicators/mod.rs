//! Indicators: pure functions from a candle window to a numeric series.
//!
//! Every indicator returns a `Vec<f64>` of the same length as its input with
//! `f64::NAN` during warmup. The context builder computes each one exactly
//! once per evaluation and stores it in an [`IndicatorSet`].
//!
//! # Look-ahead contamination guard
//! No value at index t may depend on candles after t.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod rsi;
pub mod sma;
pub mod stats;
pub mod values;
pub mod volume;

pub use adx::Adx;
pub use atr::Atr;
pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::VolumeSma;
pub use values::{compute_checked, IndicatorError, IndicatorKey, IndicatorSet};
pub use volume::{AccumulationDistribution, Obv};

use crate::domain::Candle;

/// Trait for indicators.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the whole window; same length as `candles`.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Create synthetic candles from close prices for testing.
///
/// open = prev_close (or close for the first candle), high = max(open,close) + 1,
/// low = min(open,close) - 1, volume = 1000, 15-minute spacing.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                open_time: 1_700_000_000_000 + i as i64 * 900_000,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Candles from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_candles(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            open_time: 1_700_000_000_000 + i as i64 * 900_000,
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
