//! Cumulative volume flow lines.
//!
//! - OBV: running sum of volume signed by the close-to-close direction.
//! - Accumulation/Distribution: running sum of the close location value
//!   ((close - low) - (high - close)) / (high - low) times volume.
//!
//! Both are defined from the first candle (lookback 0) and start at 0.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone, Default)]
pub struct Obv;

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let mut result = Vec::with_capacity(candles.len());
        let mut total = 0.0;
        for (i, c) in candles.iter().enumerate() {
            if i > 0 {
                let prev = candles[i - 1].close;
                if c.close > prev {
                    total += c.volume;
                } else if c.close < prev {
                    total -= c.volume;
                }
            }
            result.push(total);
        }
        result
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccumulationDistribution;

impl Indicator for AccumulationDistribution {
    fn name(&self) -> &str {
        "accumulation_distribution"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let mut total = 0.0;
        candles
            .iter()
            .map(|c| {
                let range = c.high - c.low;
                if range > 0.0 && range.is_finite() {
                    let clv = ((c.close - c.low) - (c.high - c.close)) / range;
                    total += clv * c.volume;
                }
                total
            })
            .collect()
    }
}
