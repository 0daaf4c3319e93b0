//! ScanLab Runner: multi-instrument scans and backtests on top of `scanlab-core`.
//!
//! This crate provides:
//! - Run configuration with a content-addressed run id
//! - File-backed candle store and market-structure snapshots
//! - Parallel scans producing a sanitized signal feed
//! - Parallel backtests with per-instrument isolation, progress and cancel
//! - Aggregate statistics with score calibration buckets
//! - JSON / CSV export and deterministic synthetic data

pub mod backtest;
pub mod config;
pub mod error;
pub mod export;
pub mod market_files;
pub mod progress;
pub mod scan;
pub mod statistics;
pub mod store;
pub mod synthetic;

pub use backtest::{run_backtest, BacktestRun, SkippedInstrument};
pub use config::{RunConfig, RunConfigError, RunId};
pub use error::RunError;
pub use market_files::FileMarketProvider;
pub use progress::{Progress, ProgressCallback, ProgressTracker};
pub use scan::{scan, ScanError, SignalFeed};
pub use statistics::{RunStatistics, ScoreBucket};
pub use store::{CandleSource, FileCandleStore, LoadError};
