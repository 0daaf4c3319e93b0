//! Trendline detection over an oscillator (RSI) series.
//!
//! Stateless: the detector is re-run from scratch on every context build, so
//! the same input always yields the same lines.

pub mod pivot;

pub use pivot::{find_pivots, select_pivots, Extremum, TrendlinePivot};

use crate::config::TrendlineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendlineKind {
    Resistance,
    Support,
}

/// Line through two pivots. Invariant: `pivot_1.index < pivot_2.index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trendline {
    pub kind: TrendlineKind,
    pub pivot_1: TrendlinePivot,
    pub pivot_2: TrendlinePivot,
    pub slope: f64,
    pub intercept: f64,
    pub equation: String,
}

impl Trendline {
    /// None unless the pivots are strictly ordered and finite.
    pub fn through(kind: TrendlineKind, a: TrendlinePivot, b: TrendlinePivot) -> Option<Self> {
        let (p1, p2) = if a.index < b.index { (a, b) } else { (b, a) };
        if p1.index == p2.index || !p1.value.is_finite() || !p2.value.is_finite() {
            return None;
        }
        let slope = (p2.value - p1.value) / (p2.index - p1.index) as f64;
        let intercept = p1.value - slope * p1.index as f64;
        Some(Self {
            kind,
            pivot_1: p1,
            pivot_2: p2,
            slope,
            intercept,
            equation: format!("y = {slope:.4}x + {intercept:.2}"),
        })
    }

    /// Projected line value at `index`.
    pub fn value_at(&self, index: usize) -> f64 {
        self.slope * index as f64 + self.intercept
    }

    /// Candles between the two anchors.
    pub fn duration(&self) -> usize {
        self.pivot_2.index - self.pivot_1.index
    }

    /// |slope| * duration^2: steep lines held for long carry the most weight.
    pub fn force(&self) -> f64 {
        let d = self.duration() as f64;
        self.slope.abs() * d * d
    }
}

/// Both sides of the detector's output; a side is absent when fewer than two
/// qualifying pivots exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trendlines {
    pub resistance: Option<Trendline>,
    pub support: Option<Trendline>,
}

impl Trendlines {
    pub fn get(&self, kind: TrendlineKind) -> Option<&Trendline> {
        match kind {
            TrendlineKind::Resistance => self.resistance.as_ref(),
            TrendlineKind::Support => self.support.as_ref(),
        }
    }
}

/// Detect resistance and support lines in the last `config.lookback` values.
pub fn detect(series: &[f64], config: &TrendlineConfig) -> Trendlines {
    let start = series.len().saturating_sub(config.lookback);
    Trendlines {
        resistance: detect_side(series, start, Extremum::Peak, config),
        support: detect_side(series, start, Extremum::Trough, config),
    }
}

fn detect_side(
    series: &[f64],
    start: usize,
    kind: Extremum,
    config: &TrendlineConfig,
) -> Option<Trendline> {
    let candidates = find_pivots(series, start, kind);
    let chosen = select_pivots(candidates, config.min_prominence, config.min_separation, 2);
    let [a, b] = chosen.as_slice() else {
        return None;
    };
    let line_kind = match kind {
        Extremum::Peak => TrendlineKind::Resistance,
        Extremum::Trough => TrendlineKind::Support,
    };
    Trendline::through(line_kind, *a, *b)
}
