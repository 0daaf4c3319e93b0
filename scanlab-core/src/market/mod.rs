//! Market-structure data: open interest, funding and long/short ratio.
//!
//! The provider itself is an external collaborator; only its data contract
//! lives here. Implementations handle symbol resolution and fetching. The
//! cache and circuit breaker sit above the trait in [`CachedProvider`].

pub mod cache;
pub mod cached;
pub mod circuit_breaker;

pub use cache::MarketCache;
pub use cached::CachedProvider;
pub use circuit_breaker::{BreakerState, CircuitBreaker};

use crate::domain::Instrument;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// One provider observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketPoint {
    /// Epoch milliseconds (UTC).
    pub time: i64,
    pub open_interest: f64,
    #[serde(default)]
    pub funding_rate: Option<f64>,
    #[serde(default)]
    pub long_short_ratio: Option<f64>,
}

/// How the provider matched an instrument to one of its own symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SymbolResolution {
    Resolved { provider_symbol: String },
    /// No exact pair; data is aggregated across pairs of the same base asset.
    AggregatedFallback { provider_symbol: String },
    #[default]
    Unavailable,
}

impl SymbolResolution {
    pub fn is_available(&self) -> bool {
        !matches!(self, SymbolResolution::Unavailable)
    }
}

/// Time series for one instrument, oldest point first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSeries {
    #[serde(default)]
    pub points: Vec<MarketPoint>,
    #[serde(default)]
    pub predicted_funding_rate: Option<f64>,
    #[serde(default)]
    pub resolution: SymbolResolution,
}

impl MarketSeries {
    /// Points sorted by time with non-finite open interest dropped.
    pub fn normalized(mut self) -> Self {
        self.points.retain(|p| p.open_interest.is_finite());
        self.points.sort_by_key(|p| p.time);
        self.points.dedup_by_key(|p| p.time);
        self
    }

    /// Copy restricted to points at or before `as_of`.
    ///
    /// The predicted funding rate is a live forecast, so it is only kept when
    /// no point had to be cut.
    pub fn until(&self, as_of: i64) -> Self {
        let points: Vec<MarketPoint> =
            self.points.iter().filter(|p| p.time <= as_of).copied().collect();
        let cut = points.len() < self.points.len();
        Self {
            points,
            predicted_funding_rate: if cut { None } else { self.predicted_funding_rate },
            resolution: self.resolution.clone(),
        }
    }

    pub fn open_interest(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.open_interest).collect()
    }

    pub fn latest_funding(&self) -> Option<f64> {
        self.points
            .iter()
            .rev()
            .find_map(|p| p.funding_rate)
            .filter(|f| f.is_finite())
    }

    pub fn long_short_ratios(&self) -> Vec<f64> {
        self.points
            .iter()
            .filter_map(|p| p.long_short_ratio)
            .filter(|r| r.is_finite())
            .collect()
    }

    /// Open interest at the last point at or before `time`.
    pub fn open_interest_at(&self, time: i64) -> Option<f64> {
        self.points
            .iter()
            .rev()
            .find(|p| p.time <= time)
            .map(|p| p.open_interest)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("no market-structure data for {symbol}")]
    Unavailable { symbol: String },

    #[error("rate limited by provider")]
    RateLimited,

    #[error("hard stop: provider calls refused (circuit breaker open)")]
    CircuitOpen,

    #[error("malformed provider payload for {symbol}: {reason}")]
    Malformed { symbol: String, reason: String },

    #[error("provider I/O: {0}")]
    Io(String),
}

impl ProviderError {
    /// Whether the failure says something about provider health rather than
    /// about a single symbol.
    pub fn counts_against_provider(&self) -> bool {
        matches!(self, ProviderError::RateLimited | ProviderError::Io(_))
    }
}

/// Source of market-structure data.
pub trait MarketStructureProvider: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, instrument: &Instrument) -> SymbolResolution;

    fn fetch(&self, instrument: &Instrument) -> Result<MarketSeries, ProviderError>;

    /// Fetch many instruments. Keyed by raw symbol.
    fn fetch_batch(
        &self,
        instruments: &[Instrument],
    ) -> HashMap<String, Result<MarketSeries, ProviderError>> {
        instruments
            .iter()
            .map(|i| (i.symbol.clone(), self.fetch(i)))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory provider that counts fetches.
    pub struct StaticProvider {
        pub series: HashMap<String, MarketSeries>,
        pub fail_with: Option<ProviderError>,
        pub calls: AtomicUsize,
    }

    impl StaticProvider {
        pub fn new(series: HashMap<String, MarketSeries>) -> Self {
            Self {
                series,
                fail_with: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(err: ProviderError) -> Self {
            Self {
                series: HashMap::new(),
                fail_with: Some(err),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MarketStructureProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        fn resolve(&self, instrument: &Instrument) -> SymbolResolution {
            if self.series.contains_key(&instrument.symbol) {
                SymbolResolution::Resolved {
                    provider_symbol: instrument.symbol.clone(),
                }
            } else {
                SymbolResolution::Unavailable
            }
        }

        fn fetch(&self, instrument: &Instrument) -> Result<MarketSeries, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            self.series
                .get(&instrument.symbol)
                .cloned()
                .ok_or_else(|| ProviderError::Unavailable {
                    symbol: instrument.symbol.clone(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(time: i64, oi: f64) -> MarketPoint {
        MarketPoint {
            time,
            open_interest: oi,
            funding_rate: Some(0.0001 * time as f64),
            long_short_ratio: Some(1.0),
        }
    }

    #[test]
    fn until_cuts_future_points_and_prediction() {
        let series = MarketSeries {
            points: vec![point(1, 10.0), point(2, 11.0), point(3, 12.0)],
            predicted_funding_rate: Some(0.002),
            resolution: SymbolResolution::Unavailable,
        };
        let cut = series.until(2);
        assert_eq!(cut.points.len(), 2);
        assert_eq!(cut.predicted_funding_rate, None);
        assert_eq!(series.until(3).predicted_funding_rate, Some(0.002));
    }

    #[test]
    fn normalized_sorts_and_drops_bad_points() {
        let series = MarketSeries {
            points: vec![point(3, 12.0), point(1, f64::NAN), point(2, 11.0), point(2, 11.5)],
            ..Default::default()
        }
        .normalized();
        let times: Vec<i64> = series.points.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![2, 3]);
    }

    #[test]
    fn open_interest_lookup_uses_last_known_point() {
        let series = MarketSeries {
            points: vec![point(10, 100.0), point(20, 120.0)],
            ..Default::default()
        };
        assert_eq!(series.open_interest_at(15), Some(100.0));
        assert_eq!(series.open_interest_at(25), Some(120.0));
        assert_eq!(series.open_interest_at(5), None);
    }

    #[test]
    fn resolution_serializes_with_state_tag() {
        let json = serde_json::to_string(&SymbolResolution::AggregatedFallback {
            provider_symbol: "BTC".into(),
        })
        .unwrap();
        assert!(json.contains("\"state\":\"aggregated_fallback\""));
    }
}
