//! Precomputed indicator container.
//!
//! Built once by the context builder, then read by every evaluator. Keys are a
//! closed enum so a typo is a compile error rather than a silent `None`.

use super::Indicator;
use crate::domain::Candle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Every indicator an evaluator may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKey {
    Rsi,
    EmaFast,
    EmaSlow,
    Adx,
    Atr,
    Obv,
    MoneyFlow,
    VolumeSma,
}

impl IndicatorKey {
    pub const ALL: [IndicatorKey; 8] = [
        IndicatorKey::Rsi,
        IndicatorKey::EmaFast,
        IndicatorKey::EmaSlow,
        IndicatorKey::Adx,
        IndicatorKey::Atr,
        IndicatorKey::Obv,
        IndicatorKey::MoneyFlow,
        IndicatorKey::VolumeSma,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorKey::Rsi => "rsi",
            IndicatorKey::EmaFast => "ema_fast",
            IndicatorKey::EmaSlow => "ema_slow",
            IndicatorKey::Adx => "adx",
            IndicatorKey::Atr => "atr",
            IndicatorKey::Obv => "obv",
            IndicatorKey::MoneyFlow => "money_flow",
            IndicatorKey::VolumeSma => "volume_sma",
        }
    }
}

impl fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a computed series was discarded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("{name}: output length {got} does not match input length {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("{name}: no finite values in {len} candles (lookback {lookback})")]
    NoFiniteValues {
        name: String,
        len: usize,
        lookback: usize,
    },

    #[error("{name}: latest value is not finite")]
    NonFiniteLatest { name: String },
}

/// Run an indicator and check its output is usable at the latest candle.
pub fn compute_checked(
    indicator: &dyn Indicator,
    candles: &[Candle],
) -> Result<Vec<f64>, IndicatorError> {
    let series = indicator.compute(candles);
    if series.len() != candles.len() {
        return Err(IndicatorError::LengthMismatch {
            name: indicator.name().to_string(),
            expected: candles.len(),
            got: series.len(),
        });
    }
    if !series.iter().any(|v| v.is_finite()) {
        return Err(IndicatorError::NoFiniteValues {
            name: indicator.name().to_string(),
            len: candles.len(),
            lookback: indicator.lookback(),
        });
    }
    match series.last() {
        Some(v) if v.is_finite() => Ok(series),
        _ => Err(IndicatorError::NonFiniteLatest {
            name: indicator.name().to_string(),
        }),
    }
}

/// Indicator series keyed by [`IndicatorKey`], all aligned to the same candle window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    series: BTreeMap<IndicatorKey, Vec<f64>>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: IndicatorKey, values: Vec<f64>) {
        self.series.insert(key, values);
    }

    /// Value at a specific candle index.
    pub fn get(&self, key: IndicatorKey, index: usize) -> Option<f64> {
        self.series.get(&key).and_then(|v| v.get(index).copied())
    }

    /// Latest value, if present and finite.
    pub fn last(&self, key: IndicatorKey) -> Option<f64> {
        self.series
            .get(&key)
            .and_then(|v| v.last().copied())
            .filter(|v| v.is_finite())
    }

    /// Value `back` candles before the latest, if finite.
    pub fn back(&self, key: IndicatorKey, back: usize) -> Option<f64> {
        let s = self.series.get(&key)?;
        let idx = s.len().checked_sub(1 + back)?;
        s.get(idx).copied().filter(|v| v.is_finite())
    }

    pub fn series(&self, key: IndicatorKey) -> Option<&[f64]> {
        self.series.get(&key).map(|v| v.as_slice())
    }

    pub fn contains(&self, key: IndicatorKey) -> bool {
        self.series.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = IndicatorKey> + '_ {
        self.series.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, Ema};

    #[test]
    fn insert_and_get() {
        let mut set = IndicatorSet::new();
        set.insert(IndicatorKey::Rsi, vec![f64::NAN, 40.0, 45.0]);
        assert!(set.get(IndicatorKey::Rsi, 0).unwrap().is_nan());
        assert_eq!(set.get(IndicatorKey::Rsi, 2), Some(45.0));
        assert_eq!(set.get(IndicatorKey::Rsi, 3), None);
        assert_eq!(set.last(IndicatorKey::Rsi), Some(45.0));
        assert_eq!(set.back(IndicatorKey::Rsi, 1), Some(40.0));
        assert_eq!(set.back(IndicatorKey::Rsi, 2), None);
        assert_eq!(set.back(IndicatorKey::Rsi, 5), None);
    }

    #[test]
    fn missing_key() {
        let set = IndicatorSet::new();
        assert!(set.is_empty());
        assert_eq!(set.last(IndicatorKey::Atr), None);
        assert!(!set.contains(IndicatorKey::Atr));
    }

    #[test]
    fn checked_rejects_warmup_only_output() {
        let candles = make_candles(&[1.0, 2.0, 3.0]);
        let err = compute_checked(&Ema::new(5), &candles).unwrap_err();
        assert!(matches!(err, IndicatorError::NoFiniteValues { .. }));
    }

    #[test]
    fn checked_rejects_non_finite_latest() {
        let mut candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        candles[3].close = f64::NAN;
        let err = compute_checked(&Ema::new(2), &candles).unwrap_err();
        assert_eq!(
            err,
            IndicatorError::NonFiniteLatest {
                name: "ema_2".into()
            }
        );
    }

    #[test]
    fn checked_accepts_valid_series() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        let series = compute_checked(&Ema::new(2), &candles).unwrap();
        assert_eq!(series.len(), 4);
    }
}
