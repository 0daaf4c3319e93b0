//! Structural features derived from the LTF window and its indicators.

use crate::config::ContextConfig;
use crate::domain::{Candle, Side};
use crate::indicators::stats::{linreg_slope, mean};
use crate::indicators::{IndicatorKey, IndicatorSet};
use crate::trendline::{find_pivots, Extremum};
use serde::{Deserialize, Serialize};

/// Highest high and lowest low over the swing lookback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingRange {
    pub high: f64,
    pub high_index: usize,
    pub low: f64,
    pub low_index: usize,
}

impl SwingRange {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// The swing that a pullback in `side`'s direction retraces: for LONG the
    /// low came first and the high after it.
    pub fn impulse_matches(&self, side: Side) -> bool {
        match side {
            Side::Long => self.low_index < self.high_index,
            Side::Short => self.high_index < self.low_index,
        }
    }

    /// Fraction of the swing given back by `close`, measured from the extreme
    /// the impulse ended at.
    pub fn retracement(&self, side: Side, close: f64) -> Option<f64> {
        let range = self.range();
        if range <= 0.0 || !range.is_finite() || !close.is_finite() {
            return None;
        }
        Some(match side {
            Side::Long => (self.high - close) / range,
            Side::Short => (close - self.low) / range,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    /// Lower price low with a higher RSI low.
    Bullish,
    /// Higher price high with a lower RSI high.
    Bearish,
}

impl Divergence {
    /// Direction the divergence argues for.
    pub fn side(self) -> Side {
        match self {
            Divergence::Bullish => Side::Long,
            Divergence::Bearish => Side::Short,
        }
    }
}

/// Divergence with the index of the pivot that completed it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceMark {
    pub kind: Divergence,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub swing: Option<SwingRange>,
    pub divergence: Option<DivergenceMark>,
    /// Last candle volume over the trailing average (excluding itself).
    pub volume_ratio: Option<f64>,
    /// OBV least-squares slope per candle, normalized by mean volume.
    pub obv_slope: Option<f64>,
    /// Accumulation/distribution slope per candle, normalized by mean volume.
    pub money_flow_slope: Option<f64>,
}

impl Features {
    pub fn compute(candles: &[Candle], indicators: &IndicatorSet, config: &ContextConfig) -> Self {
        let rsi = indicators.series(IndicatorKey::Rsi);
        let last = candles.len().saturating_sub(1);
        Self {
            swing: swing_range(candles, config.swing_lookback),
            divergence: rsi.and_then(|r| {
                detect_divergence(
                    candles,
                    r,
                    config.divergence_lookback,
                    config.divergence_separation,
                )
            }),
            volume_ratio: volume_ratio_at(candles, indicators, last),
            obv_slope: indicators
                .series(IndicatorKey::Obv)
                .and_then(|s| flow_slope(s, candles, config.money_flow_lookback)),
            money_flow_slope: indicators
                .series(IndicatorKey::MoneyFlow)
                .and_then(|s| flow_slope(s, candles, config.money_flow_lookback)),
        }
    }
}

pub fn swing_range(candles: &[Candle], lookback: usize) -> Option<SwingRange> {
    let start = candles.len().saturating_sub(lookback);
    let window = candles.get(start..)?;
    let mut swing: Option<SwingRange> = None;
    for (offset, c) in window.iter().enumerate() {
        if !(c.high.is_finite() && c.low.is_finite()) {
            continue;
        }
        let i = start + offset;
        let s = swing.get_or_insert(SwingRange {
            high: c.high,
            high_index: i,
            low: c.low,
            low_index: i,
        });
        if c.high > s.high {
            s.high = c.high;
            s.high_index = i;
        }
        if c.low < s.low {
            s.low = c.low;
            s.low_index = i;
        }
    }
    swing
}

/// Volume of candle `index` over the volume SMA ending one candle earlier.
pub fn volume_ratio_at(candles: &[Candle], indicators: &IndicatorSet, index: usize) -> Option<f64> {
    let volume = candles.get(index)?.volume;
    let avg = indicators.get(IndicatorKey::VolumeSma, index.checked_sub(1)?)?;
    (avg.is_finite() && avg > 0.0 && volume.is_finite()).then(|| volume / avg)
}

fn flow_slope(series: &[f64], candles: &[Candle], lookback: usize) -> Option<f64> {
    if lookback < 2 || series.len() < lookback {
        return None;
    }
    let start = series.len() - lookback;
    let slope = linreg_slope(&series[start..])?;
    let volumes: Vec<f64> = candles[start..].iter().map(|c| c.volume).collect();
    let avg_volume = mean(&volumes)?;
    (avg_volume > 0.0).then(|| slope / avg_volume)
}

/// Regular divergence between close-price pivots and RSI at the same candles.
/// When both kinds are present, the one completed most recently wins.
pub fn detect_divergence(
    candles: &[Candle],
    rsi: &[f64],
    lookback: usize,
    min_separation: usize,
) -> Option<DivergenceMark> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let start = closes.len().saturating_sub(lookback);

    let last_pair = |kind: Extremum| {
        let pivots = find_pivots(&closes, start, kind);
        let second = pivots.last()?;
        let first = pivots
            .iter()
            .rev()
            .find(|p| second.index - p.index >= min_separation.max(1))?;
        Some((*first, *second))
    };

    let rsi_at = |i: usize| rsi.get(i).copied().filter(|v| v.is_finite());

    let bullish = last_pair(Extremum::Trough).and_then(|(a, b)| {
        let (ra, rb) = (rsi_at(a.index)?, rsi_at(b.index)?);
        (b.value < a.value && rb > ra).then_some(DivergenceMark {
            kind: Divergence::Bullish,
            index: b.index,
        })
    });
    let bearish = last_pair(Extremum::Peak).and_then(|(a, b)| {
        let (ra, rb) = (rsi_at(a.index)?, rsi_at(b.index)?);
        (b.value > a.value && rb < ra).then_some(DivergenceMark {
            kind: Divergence::Bearish,
            index: b.index,
        })
    });

    match (bullish, bearish) {
        (Some(a), Some(b)) => Some(if a.index >= b.index { a } else { b }),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    #[test]
    fn swing_tracks_extremes_and_order() {
        let candles = make_candles(&[100.0, 90.0, 95.0, 120.0, 110.0]);
        let swing = swing_range(&candles, 50).unwrap();
        // make_candles: high = max(open, close) + 1, low = min(open, close) - 1
        assert_eq!(swing.high, 121.0);
        assert_eq!(swing.high_index, 3);
        assert_eq!(swing.low, 89.0);
        assert_eq!(swing.low_index, 1);
        assert!(swing.impulse_matches(Side::Long));
        let depth = swing.retracement(Side::Long, 110.0).unwrap();
        assert!((depth - 11.0 / 32.0).abs() < 1e-12);
    }

    #[test]
    fn swing_respects_lookback() {
        let candles = make_candles(&[200.0, 100.0, 101.0, 102.0]);
        let swing = swing_range(&candles, 2).unwrap();
        assert_eq!(swing.low_index, 2);
    }

    #[test]
    fn bullish_divergence_lower_low_higher_rsi() {
        // price troughs at 2 (90) and 8 (85); RSI higher at the second trough
        let closes = [100.0, 95.0, 90.0, 96.0, 99.0, 97.0, 93.0, 89.0, 85.0, 92.0, 95.0];
        let candles = make_candles(&closes);
        let mut rsi = vec![50.0; closes.len()];
        rsi[2] = 25.0;
        rsi[8] = 35.0;
        let mark = detect_divergence(&candles, &rsi, 40, 3).unwrap();
        assert_eq!(mark.kind, Divergence::Bullish);
        assert_eq!(mark.index, 8);
        assert_eq!(mark.kind.side(), Side::Long);
    }

    #[test]
    fn no_divergence_when_rsi_confirms() {
        let closes = [100.0, 95.0, 90.0, 96.0, 99.0, 97.0, 93.0, 89.0, 85.0, 92.0, 95.0];
        let candles = make_candles(&closes);
        let mut rsi = vec![50.0; closes.len()];
        rsi[2] = 35.0;
        rsi[8] = 25.0;
        // peak at 4 is the only peak, so no bearish pair either
        assert!(detect_divergence(&candles, &rsi, 40, 3).is_none());
    }

    #[test]
    fn volume_ratio_uses_prior_average() {
        let mut candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        candles[3].volume = 3000.0;
        let mut set = IndicatorSet::new();
        set.insert(IndicatorKey::VolumeSma, vec![f64::NAN, 1000.0, 1000.0, 1500.0]);
        let ratio = volume_ratio_at(&candles, &set, 3).unwrap();
        assert!((ratio - 3.0).abs() < 1e-12);
        assert!(volume_ratio_at(&candles, &set, 1).is_none());
    }

    #[test]
    fn flow_slope_normalized_by_volume() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let obv = [0.0, 1000.0, 2000.0, 3000.0, 4000.0];
        let slope = flow_slope(&obv, &candles, 5).unwrap();
        assert!((slope - 1.0).abs() < 1e-12);
    }
}
