//! Serializable run configuration.
//!
//! A `RunConfig` names where candles and market snapshots live, which
//! timeframes and instruments to use, which evaluators to run, and carries the
//! full [`EngineConfig`]. Every field has a default so a TOML file only names
//! what it changes:
//!
//! ```toml
//! candles_dir = "data/candles"
//! market_dir = "data/market"
//! ltf = "15m"
//! htf = "4h"
//! instruments = ["BTCUSDT", "ETHUSDT"]
//! strategies = ["breakout", "institutional_breakout"]
//!
//! [engine.breakout]
//! oi_slope_policy = "distribution_trap"
//! ```

use scanlab_core::config::ConfigError as EngineConfigError;
use scanlab_core::domain::StrategyKind;
use scanlab_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("read run config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse run config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize run config: {0}")]
    Serialize(String),

    #[error(transparent)]
    Engine(#[from] EngineConfigError),

    #[error("invalid run config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding `{SYMBOL}_{timeframe}.json|csv` candle files.
    pub candles_dir: PathBuf,

    /// Directory holding `{SYMBOL}.json` market-structure snapshots.
    /// Without it every context runs with neutral market defaults.
    pub market_dir: Option<PathBuf>,

    /// Exchange label attached to every instrument.
    pub exchange: String,

    pub ltf: String,
    pub htf: String,

    /// Symbols to process. Empty means every symbol with an LTF file.
    pub instruments: Vec<String>,

    pub strategies: Vec<StrategyKind>,

    /// Worker threads for the instrument pool. 0 lets rayon decide.
    pub threads: usize,

    pub engine: EngineConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            candles_dir: PathBuf::from("data/candles"),
            market_dir: None,
            exchange: "binance".into(),
            ltf: "15m".into(),
            htf: "4h".into(),
            instruments: Vec::new(),
            strategies: StrategyKind::ALL.to_vec(),
            threads: 0,
            engine: EngineConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, RunConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, RunConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, RunConfigError> {
        toml::to_string_pretty(self).map_err(|e| RunConfigError::Serialize(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        if self.strategies.is_empty() {
            return Err(RunConfigError::Invalid("no strategies selected".into()));
        }
        if self.ltf.trim().is_empty() || self.htf.trim().is_empty() {
            return Err(RunConfigError::Invalid("timeframe labels must not be empty".into()));
        }
        if self.ltf == self.htf {
            return Err(RunConfigError::Invalid(format!(
                "ltf and htf are both '{}'",
                self.ltf
            )));
        }
        self.engine.validate()?;
        Ok(())
    }

    /// Engine config with this run's timeframe labels applied.
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = self.engine.clone();
        engine.context.ltf_label = self.ltf.clone();
        engine.context.htf_label = self.htf.clone();
        engine
    }

    /// Deterministic fingerprint of everything that affects results.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> Result<RunId, RunConfigError> {
        let json =
            serde_json::to_string(self).map_err(|e| RunConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlab_core::config::OiSlopePolicy;

    #[test]
    fn test_run_id_deterministic() {
        let config = RunConfig::default();
        let id1 = config.run_id().unwrap();
        let id2 = config.run_id().unwrap();
        assert_eq!(id1, id2, "RunId should be deterministic");
        assert_eq!(id1.len(), 64);
    }

    #[test]
    fn test_run_id_changes_with_params() {
        let config1 = RunConfig::default();
        let mut config2 = config1.clone();
        config2.engine.simulation.lookahead = 48;
        assert_ne!(config1.run_id().unwrap(), config2.run_id().unwrap());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RunConfig::from_toml(
            r#"
            instruments = ["BTCUSDT"]
            strategies = ["breakout"]

            [engine.breakout]
            oi_slope_policy = "distribution_trap"
            "#,
        )
        .unwrap();
        assert_eq!(config.instruments, vec!["BTCUSDT".to_string()]);
        assert_eq!(config.strategies, vec![StrategyKind::Breakout]);
        assert_eq!(config.engine.breakout.oi_slope_policy, OiSlopePolicy::DistributionTrap);
        assert_eq!(config.ltf, "15m");
        assert_eq!(config.engine.simulation, EngineConfig::default().simulation);
    }

    #[test]
    fn toml_round_trip() {
        let config = RunConfig {
            market_dir: Some(PathBuf::from("data/market")),
            ..RunConfig::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(RunConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn engine_config_carries_timeframe_labels() {
        let config = RunConfig {
            ltf: "5m".into(),
            htf: "1h".into(),
            ..RunConfig::default()
        };
        let engine = config.engine_config();
        assert_eq!(engine.context.ltf_label, "5m");
        assert_eq!(engine.context.htf_label, "1h");
    }

    #[test]
    fn rejects_empty_strategy_list() {
        let err = RunConfig::from_toml("strategies = []").unwrap_err();
        assert!(matches!(err, RunConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_identical_timeframes() {
        let err = RunConfig::from_toml("ltf = \"1h\"\nhtf = \"1h\"").unwrap_err();
        assert!(err.to_string().contains("1h"));
    }
}
