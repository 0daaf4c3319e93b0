//! ScanLab Core: candles, indicators, trendlines, context builder, strategy
//! evaluators, trade simulator.
//!
//! Everything here is synchronous and pure given its inputs:
//! - Domain types (candles, instruments, signals, setups, trade outcomes)
//! - Indicator suite computed once per context
//! - RSI pivot/trendline detection
//! - Market-structure provider seam with TTL cache and circuit breaker
//! - Three evaluators sharing one signal shape and action rule
//! - Forward trade simulation and per-instrument historical replay

pub mod backtest;
pub mod config;
pub mod context;
pub mod domain;
pub mod indicators;
pub mod market;
pub mod strategy;
pub mod trendline;

pub use config::EngineConfig;
pub use context::{Context, ContextBuilder, MarketInput};
pub use strategy::{create_evaluator, Evaluator};
