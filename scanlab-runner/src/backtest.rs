//! Multi-instrument backtest: replay every selected strategy over each
//! instrument's history in parallel, then aggregate.
//!
//! Each instrument is an isolated unit of work. Unreadable files, a missing
//! HTF series or too little history skip that instrument (or that
//! instrument/strategy pair), are logged, and land in `skipped`.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use scanlab_core::backtest::{replay_instrument, ReplayReport};
use scanlab_core::domain::{Instrument, Sanitize, StrategyKind, TradeRecord};
use scanlab_core::market::{MarketSeries, MarketStructureProvider};
use scanlab_core::strategy::{create_evaluator, Evaluator};
use scanlab_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{RunConfig, RunId};
use crate::error::RunError;
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::scan::{install, resolve_symbols};
use crate::statistics::RunStatistics;
use crate::store::CandleSource;

/// An instrument (or one of its strategies) left out of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedInstrument {
    pub symbol: String,
    /// `None` when the instrument failed before any strategy ran.
    pub strategy: Option<StrategyKind>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub instruments: usize,
    /// Stopped early by the cancel flag.
    pub cancelled: bool,
    pub statistics: RunStatistics,
    /// Ordered by signal time, then symbol.
    pub trades: Vec<TradeRecord>,
    pub skipped: Vec<SkippedInstrument>,
}

#[derive(Default)]
struct InstrumentResult {
    reports: Vec<(StrategyKind, ReplayReport)>,
    skipped: Vec<SkippedInstrument>,
}

/// Run a full backtest.
///
/// # Arguments
/// - `provider`: optional market-structure source, fetched once per instrument.
/// - `progress_cb`: called from worker threads after each instrument.
/// - `cancel`: cooperative stop; finished work is still aggregated.
pub fn run_backtest(
    config: &RunConfig,
    source: &dyn CandleSource,
    provider: Option<&dyn MarketStructureProvider>,
    progress_cb: Option<ProgressCallback<'_>>,
    cancel: Option<&AtomicBool>,
) -> Result<BacktestRun, RunError> {
    config.validate()?;
    let run_id = config.run_id()?;
    let symbols = resolve_symbols(config, source)?;
    let started_at = Utc::now();
    let clock = Instant::now();

    let engine = config.engine_config();
    let evaluators: Vec<Box<dyn Evaluator>> = config
        .strategies
        .iter()
        .map(|&kind| create_evaluator(kind, &engine))
        .collect();
    let tracker = ProgressTracker::new(symbols.len());

    info!(
        run_id = %run_id,
        instruments = symbols.len(),
        strategies = evaluators.len(),
        step = engine.simulation.step,
        lookahead = engine.simulation.lookahead,
        "starting backtest"
    );

    let results: Vec<InstrumentResult> = install(config.threads, || {
        symbols
            .par_iter()
            .map(|symbol| {
                if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                    return InstrumentResult::default();
                }
                let instrument = Instrument::new(symbol.as_str(), config.exchange.as_str());
                let result = backtest_instrument(
                    config,
                    &engine,
                    source,
                    provider,
                    &evaluators,
                    &instrument,
                    cancel,
                );
                let p = tracker.advance(symbol);
                if let Some(cb) = progress_cb {
                    cb(&p);
                }
                std::thread::yield_now();
                result
            })
            .collect()
    })?;

    let mut reports = Vec::new();
    let mut skipped = Vec::new();
    for r in results {
        reports.extend(r.reports);
        skipped.extend(r.skipped);
    }

    let cancelled = cancel.is_some_and(|f| f.load(Ordering::Relaxed))
        || reports.iter().any(|(_, r)| r.cancelled);
    let statistics = RunStatistics::compute(
        reports.iter().map(|(kind, report)| (*kind, report)),
        engine.simulation.score_bucket_width,
    );

    let mut trades: Vec<TradeRecord> = reports
        .into_iter()
        .flat_map(|(_, report)| report.trades)
        .collect();
    for t in &mut trades {
        t.sanitize();
    }
    trades.sort_by(|a, b| {
        a.signal_time
            .cmp(&b.signal_time)
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| a.strategy.as_str().cmp(b.strategy.as_str()))
    });

    let run = BacktestRun {
        run_id,
        started_at,
        elapsed_secs: clock.elapsed().as_secs_f64(),
        instruments: symbols.len(),
        cancelled,
        statistics,
        trades,
        skipped,
    };
    info!(
        trades = run.trades.len(),
        skipped = run.skipped.len(),
        win_rate = run.statistics.win_rate,
        cancelled = run.cancelled,
        elapsed_secs = run.elapsed_secs,
        "backtest complete"
    );
    Ok(run)
}

fn backtest_instrument(
    config: &RunConfig,
    engine: &EngineConfig,
    source: &dyn CandleSource,
    provider: Option<&dyn MarketStructureProvider>,
    evaluators: &[Box<dyn Evaluator>],
    instrument: &Instrument,
    cancel: Option<&AtomicBool>,
) -> InstrumentResult {
    let symbol = instrument.symbol.as_str();
    let mut out = InstrumentResult::default();
    let skip = |strategy: Option<StrategyKind>, reason: String| {
        warn!(symbol, strategy = ?strategy, reason = %reason, "skipping");
        SkippedInstrument {
            symbol: symbol.to_string(),
            strategy,
            reason,
        }
    };

    let loaded = source
        .load(symbol, &config.ltf)
        .and_then(|ltf| Ok((ltf, source.load(symbol, &config.htf)?)));
    let (ltf, htf) = match loaded {
        Ok(pair) => pair,
        Err(e) => {
            out.skipped.push(skip(None, e.to_string()));
            return out;
        }
    };

    let market: Option<MarketSeries> = provider.and_then(|p| match p.fetch(instrument) {
        Ok(series) => Some(series),
        Err(e) => {
            debug!(symbol, error = %e, "no market data, using neutral defaults");
            None
        }
    });

    for evaluator in evaluators {
        let kind = evaluator.kind();
        match replay_instrument(
            instrument,
            &ltf,
            &htf,
            market.as_ref(),
            evaluator.as_ref(),
            engine,
            cancel,
        ) {
            Ok(report) => {
                debug!(
                    symbol,
                    strategy = %kind,
                    evaluations = report.evaluations,
                    trades = report.trades.len(),
                    "replayed"
                );
                out.reports.push((kind, report));
            }
            Err(e) => out.skipped.push(skip(Some(kind), e.to_string())),
        }
    }
    out
}
