//! Market-structure fields merged into a context, with explicit availability.

use crate::config::ContextConfig;
use crate::indicators::stats::{pct_change, zscore_last};
use crate::market::{MarketPoint, MarketSeries, SymbolResolution};
use serde::{Deserialize, Serialize};

/// Provider fields as the evaluators see them. Every value has a neutral
/// default (zero) and an availability flag; evaluators must check the flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFeatures {
    pub resolution: SymbolResolution,
    pub oi_available: bool,
    /// Points cut to the evaluation time, oldest first.
    pub oi_series: Vec<MarketPoint>,
    pub oi_zscore: f64,
    pub oi_zscore_valid: bool,
    pub funding_available: bool,
    pub funding_rate: f64,
    pub predicted_funding_rate: Option<f64>,
    pub long_short_available: bool,
    pub long_short_ratio: f64,
    pub long_short_delta: f64,
}

impl MarketFeatures {
    /// Neutral defaults: every flag false, every value zero.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn from_series(series: &MarketSeries, as_of: i64, config: &ContextConfig) -> Self {
        let series = series.until(as_of);
        let mut features = Self {
            resolution: series.resolution.clone(),
            ..Self::default()
        };

        let oi = series.open_interest();
        if !oi.is_empty() {
            features.oi_available = true;
            let start = oi.len().saturating_sub(config.oi_zscore_window);
            let window = &oi[start..];
            if window.len() >= 3 {
                if let Some(z) = zscore_last(window) {
                    features.oi_zscore = z;
                    features.oi_zscore_valid = true;
                }
            }
        }

        if let Some(funding) = series.latest_funding() {
            features.funding_available = true;
            features.funding_rate = funding;
        }
        features.predicted_funding_rate = series.predicted_funding_rate.filter(|f| f.is_finite());

        let ratios = series.long_short_ratios();
        if let Some(&last) = ratios.last() {
            features.long_short_available = true;
            features.long_short_ratio = last;
            let back = ratios.len().saturating_sub(1 + config.ls_delta_lookback);
            features.long_short_delta = last - ratios[back];
        }

        features.oi_series = series.points;
        features
    }

    /// Predicted funding when present, else the latest realized rate.
    pub fn effective_funding(&self) -> Option<f64> {
        self.predicted_funding_rate
            .or(self.funding_available.then_some(self.funding_rate))
    }

    /// Fractional OI change from the last point at or before `since` to the
    /// latest point.
    pub fn oi_change_since(&self, since: i64) -> Option<f64> {
        if !self.oi_available {
            return None;
        }
        let from = self
            .oi_series
            .iter()
            .rev()
            .find(|p| p.time <= since)
            .or(self.oi_series.first())?;
        let to = self.oi_series.last()?;
        pct_change(from.open_interest, to.open_interest)
    }
}
