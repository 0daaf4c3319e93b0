//! Market-structure provider backed by pre-fetched JSON snapshots.
//!
//! `{dir}/{SYMBOL}.json` is an exact match. When only `{dir}/{BASE}.json`
//! exists (data aggregated across every pair of the base asset) the series is
//! served as an aggregated fallback. Anything else is unavailable.
//!
//! A snapshot is either a bare array of points or an object:
//!
//! ```json
//! { "points": [{"time": 1700000000000, "open_interest": 1.2e9,
//!               "funding_rate": 0.0001, "long_short_ratio": 1.1}],
//!   "predicted_funding_rate": 0.00012 }
//! ```

use scanlab_core::domain::Instrument;
use scanlab_core::market::{
    MarketPoint, MarketSeries, MarketStructureProvider, ProviderError, SymbolResolution,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Snapshot {
    Points(Vec<MarketPoint>),
    Series {
        #[serde(default)]
        points: Vec<MarketPoint>,
        #[serde(default)]
        predicted_funding_rate: Option<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct FileMarketProvider {
    dir: PathBuf,
}

impl FileMarketProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn read(&self, path: &Path, symbol: &str) -> Result<Snapshot, ProviderError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Io(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Malformed {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })
    }
}

impl MarketStructureProvider for FileMarketProvider {
    fn name(&self) -> &str {
        "files"
    }

    fn resolve(&self, instrument: &Instrument) -> SymbolResolution {
        if self.snapshot_path(&instrument.symbol).is_file() {
            SymbolResolution::Resolved {
                provider_symbol: instrument.symbol.clone(),
            }
        } else if !instrument.base_asset.is_empty()
            && self.snapshot_path(&instrument.base_asset).is_file()
        {
            SymbolResolution::AggregatedFallback {
                provider_symbol: instrument.base_asset.clone(),
            }
        } else {
            SymbolResolution::Unavailable
        }
    }

    fn fetch(&self, instrument: &Instrument) -> Result<MarketSeries, ProviderError> {
        let resolution = self.resolve(instrument);
        let provider_symbol = match &resolution {
            SymbolResolution::Resolved { provider_symbol }
            | SymbolResolution::AggregatedFallback { provider_symbol } => provider_symbol.clone(),
            SymbolResolution::Unavailable => {
                return Err(ProviderError::Unavailable {
                    symbol: instrument.symbol.clone(),
                })
            }
        };

        let path = self.snapshot_path(&provider_symbol);
        let (points, predicted_funding_rate) = match self.read(&path, &instrument.symbol)? {
            Snapshot::Points(points) => (points, None),
            Snapshot::Series {
                points,
                predicted_funding_rate,
            } => (points, predicted_funding_rate),
        };
        let series = MarketSeries {
            points,
            predicted_funding_rate: predicted_funding_rate.filter(|v| v.is_finite()),
            resolution,
        }
        .normalized();
        debug!(
            symbol = %instrument.symbol,
            provider_symbol = %provider_symbol,
            points = series.points.len(),
            "loaded market snapshot"
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn provider_with(files: &[(&str, &str)]) -> (TempDir, FileMarketProvider) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let provider = FileMarketProvider::new(dir.path());
        (dir, provider)
    }

    #[test]
    fn exact_symbol_resolves() {
        let (_dir, provider) = provider_with(&[(
            "BTCUSDT.json",
            r#"{"points": [
                {"time": 2000, "open_interest": 11.0, "funding_rate": 0.0002},
                {"time": 1000, "open_interest": 10.0}
            ], "predicted_funding_rate": 0.0003}"#,
        )]);
        let series = provider.fetch(&Instrument::new("BTCUSDT", "test")).unwrap();
        assert_eq!(
            series.resolution,
            SymbolResolution::Resolved {
                provider_symbol: "BTCUSDT".into()
            }
        );
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].time, 1000);
        assert_eq!(series.points[0].funding_rate, None);
        assert_eq!(series.predicted_funding_rate, Some(0.0003));
    }

    #[test]
    fn base_asset_file_is_an_aggregated_fallback() {
        let (_dir, provider) = provider_with(&[(
            "ETH.json",
            r#"[{"time": 1000, "open_interest": 5.0, "long_short_ratio": 1.3}]"#,
        )]);
        let instrument = Instrument::new("ETHUSDT", "test");
        let series = provider.fetch(&instrument).unwrap();
        assert_eq!(
            series.resolution,
            SymbolResolution::AggregatedFallback {
                provider_symbol: "ETH".into()
            }
        );
        assert_eq!(series.points[0].long_short_ratio, Some(1.3));
    }

    #[test]
    fn missing_snapshot_is_unavailable() {
        let (_dir, provider) = provider_with(&[]);
        let instrument = Instrument::new("DOGEUSDT", "test");
        assert_eq!(provider.resolve(&instrument), SymbolResolution::Unavailable);
        assert!(matches!(
            provider.fetch(&instrument),
            Err(ProviderError::Unavailable { .. })
        ));
    }

    #[test]
    fn broken_snapshot_is_malformed() {
        let (_dir, provider) = provider_with(&[("BTCUSDT.json", r#"{"points": 3}"#)]);
        assert!(matches!(
            provider.fetch(&Instrument::new("BTCUSDT", "test")),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn batch_fetch_keys_by_symbol() {
        let (_dir, provider) = provider_with(&[("BTCUSDT.json", "[]")]);
        let batch = provider.fetch_batch(&[
            Instrument::new("BTCUSDT", "test"),
            Instrument::new("ETHUSDT", "test"),
        ]);
        assert!(batch["BTCUSDT"].is_ok());
        assert!(batch["ETHUSDT"].is_err());
    }
}
