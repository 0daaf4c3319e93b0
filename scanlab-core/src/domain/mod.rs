//! Domain types for ScanLab

pub mod candle;
pub mod instrument;
pub mod outcome;
pub mod sanitize;
pub mod signal;

pub use candle::{interval_ms, normalize_series, Candle, CandleError, RawCandle};
pub use instrument::{base_asset_of, Instrument};
pub use outcome::{TradeOutcome, TradeRecord, TradeResult};
pub use sanitize::{finite_or_zero, Sanitize};
pub use signal::{
    Action, AdjustmentKind, Bias, BreakoutPhase, ScoreAdjustment, ScoreComponent,
    ScoreComposition, ScoreOverride, Setup, SetupError, Side, Signal, SignalMeta, StrategyKind,
};
