//! Historical replay of one instrument.
//!
//! At each evaluation point only data visible at that candle's close is handed
//! to the context builder: the trailing LTF window, HTF candles already closed,
//! and market points up to `as_of` (cut inside the builder).

use super::simulate::simulate_trade;
use crate::config::EngineConfig;
use crate::context::{ContextBuilder, MarketInput};
use crate::domain::{interval_ms, Action, Candle, Instrument, TradeRecord};
use crate::market::MarketSeries;
use crate::strategy::Evaluator;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("insufficient history: {candles} LTF candles, need more than {required}")]
    InsufficientHistory { candles: usize, required: usize },

    #[error("no HTF candles")]
    NoHtf,
}

/// Counters and trades for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub evaluations: usize,
    /// Evaluations that returned LONG/SHORT with a setup.
    pub actionable: usize,
    pub rejected: usize,
    pub trades: Vec<TradeRecord>,
    /// Stopped early by the cancel flag.
    pub cancelled: bool,
}

/// HTF candles whose close time is at or before `as_of`.
fn closed_htf(htf: &[Candle], htf_interval: i64, as_of: i64) -> &[Candle] {
    let n = htf.partition_point(|c| c.open_time + htf_interval <= as_of);
    &htf[..n]
}

/// Replay `evaluator` over every `step`-th LTF candle after warmup.
///
/// The last candle is never an evaluation point since nothing follows it.
pub fn replay_instrument(
    instrument: &Instrument,
    ltf: &[Candle],
    htf: &[Candle],
    market: Option<&MarketSeries>,
    evaluator: &dyn Evaluator,
    config: &EngineConfig,
    cancel: Option<&AtomicBool>,
) -> Result<ReplayReport, ReplayError> {
    let sim = &config.simulation;
    let warmup = config.context.min_ltf_candles.max(1);
    if ltf.len() <= warmup {
        return Err(ReplayError::InsufficientHistory {
            candles: ltf.len(),
            required: warmup,
        });
    }
    if htf.is_empty() {
        return Err(ReplayError::NoHtf);
    }
    let ltf_interval = interval_ms(ltf).unwrap_or(0);
    let htf_interval = interval_ms(htf).unwrap_or(0);
    let builder = ContextBuilder::new(config);
    let mut report = ReplayReport::default();

    for t in (warmup - 1..ltf.len() - 1).step_by(sim.step.max(1)) {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            report.cancelled = true;
            break;
        }
        let start = (t + 1).saturating_sub(sim.context_window);
        let window = &ltf[start..=t];
        let as_of = ltf[t].open_time + ltf_interval;
        let htf_window = closed_htf(htf, htf_interval, as_of);
        let htf_start = htf_window.len().saturating_sub(sim.context_window);

        let ctx = builder.build_at(
            instrument,
            window,
            &htf_window[htf_start..],
            MarketInput::Prefetched(market),
            t,
        );
        let signal = evaluator.evaluate(&ctx);
        report.evaluations += 1;

        if signal.action == Action::Rejected {
            report.rejected += 1;
        }
        let Some(setup) = signal.setup.filter(|_| signal.action.is_directional()) else {
            continue;
        };
        report.actionable += 1;

        let outcome = simulate_trade(&setup, &ltf[t + 1..], sim);
        debug!(
            symbol = %instrument.symbol,
            index = t,
            score = signal.score,
            result = ?outcome.result,
            "simulated trade"
        );
        report.trades.push(TradeRecord {
            symbol: instrument.symbol.clone(),
            strategy: signal.strategy,
            signal_time: ltf[t].open_time,
            candle_index: t,
            score: signal.score,
            side: setup.side,
            setup,
            outcome,
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::domain::{Action, Bias, Setup, Side, Signal, StrategyKind, TradeResult};
    use crate::indicators::make_candles;
    use std::sync::atomic::AtomicUsize;

    /// Goes long at every evaluation with a tight bracket around the close.
    struct AlwaysLong {
        seen: AtomicUsize,
    }

    impl Evaluator for AlwaysLong {
        fn name(&self) -> &str {
            "always_long"
        }

        fn kind(&self) -> StrategyKind {
            StrategyKind::Breakout
        }

        fn evaluate(&self, ctx: &Context) -> Signal {
            self.seen.fetch_add(1, Ordering::Relaxed);
            let close = ctx.last_close();
            let mut signal = Signal::neutral(
                ctx.instrument.clone(),
                StrategyKind::Breakout,
                close,
                "test",
                ctx.meta(),
            );
            if ctx.is_ready() {
                signal.action = Action::Long;
                signal.bias = Bias::Long;
                signal.score = 80.0;
                signal.setup = Setup::new(Side::Long, close, close - 5.0, close + 1.0).ok();
            }
            signal
        }
    }

    fn rising(n: usize) -> Vec<Candle> {
        make_candles(&(0..n).map(|i| 100.0 + i as f64).collect::<Vec<_>>())
    }

    #[test]
    fn short_history_is_an_error() {
        let cfg = EngineConfig::default();
        let eval = AlwaysLong { seen: AtomicUsize::new(0) };
        let err = replay_instrument(
            &Instrument::new("BTCUSDT", "test"),
            &rising(30),
            &rising(30),
            None,
            &eval,
            &cfg,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::InsufficientHistory { candles: 30, .. }));
    }

    #[test]
    fn evaluates_every_step_and_records_trades() {
        let mut cfg = EngineConfig::default();
        cfg.context.min_htf_candles = 1;
        cfg.simulation.step = 5;
        let eval = AlwaysLong { seen: AtomicUsize::new(0) };
        let ltf = rising(100);
        let report = replay_instrument(
            &Instrument::new("BTCUSDT", "test"),
            &ltf,
            &ltf,
            None,
            &eval,
            &cfg,
            None,
        )
        .unwrap();
        // t = 49, 54, ..., 94 (99 is the last candle and never evaluated)
        assert_eq!(report.evaluations, 10);
        assert_eq!(eval.seen.load(Ordering::Relaxed), 10);
        assert_eq!(report.trades.len(), 10);
        let first = &report.trades[0];
        assert_eq!(first.candle_index, 49);
        assert_eq!(first.signal_time, ltf[49].open_time);
        // fills on the next candle's wick, target clears on the one after
        assert_eq!(first.outcome.result, TradeResult::Win);
        assert_eq!(first.outcome.candles_to_resolution, 2);
    }

    #[test]
    fn htf_window_only_holds_closed_candles() {
        let htf = rising(10);
        let interval = interval_ms(&htf).unwrap();
        let as_of = htf[4].open_time + interval;
        assert_eq!(closed_htf(&htf, interval, as_of).len(), 5);
        assert_eq!(closed_htf(&htf, interval, as_of - 1).len(), 4);
    }

    #[test]
    fn cancel_flag_stops_early() {
        let mut cfg = EngineConfig::default();
        cfg.context.min_htf_candles = 1;
        let eval = AlwaysLong { seen: AtomicUsize::new(0) };
        let cancel = AtomicBool::new(true);
        let ltf = rising(80);
        let report = replay_instrument(
            &Instrument::new("BTCUSDT", "test"),
            &ltf,
            &ltf,
            None,
            &eval,
            &cfg,
            Some(&cancel),
        )
        .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.evaluations, 0);
    }
}
