//! Live-style scan: evaluate the latest candles of every instrument with every
//! selected strategy and collect the signals into one feed.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use scanlab_core::context::{ContextBuilder, MarketInput};
use scanlab_core::domain::{Instrument, Sanitize, Signal};
use scanlab_core::market::{MarketSeries, MarketStructureProvider};
use scanlab_core::strategy::{create_evaluator, Evaluator};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::{RunConfig, RunId};
use crate::error::RunError;
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::store::CandleSource;

/// An instrument that could not be scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanError {
    pub symbol: String,
    pub error: String,
}

/// Output of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFeed {
    pub generated_at: DateTime<Utc>,
    pub run_id: RunId,
    pub ltf: String,
    pub htf: String,
    /// Highest score first.
    pub signals: Vec<Signal>,
    pub errors: Vec<ScanError>,
}

impl SignalFeed {
    /// Signals with a LONG/SHORT action and a setup.
    pub fn actionable(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|s| s.is_actionable())
    }
}

/// Symbols named in the config, or every symbol the source has LTF data for.
pub(crate) fn resolve_symbols(
    config: &RunConfig,
    source: &dyn CandleSource,
) -> Result<Vec<String>, RunError> {
    let symbols = if config.instruments.is_empty() {
        source.symbols(&config.ltf)?
    } else {
        config.instruments.clone()
    };
    if symbols.is_empty() {
        return Err(RunError::NoInstruments);
    }
    Ok(symbols)
}

/// Run `op` inside a dedicated pool when more than one thread is requested,
/// otherwise on the global rayon pool.
pub(crate) fn install<T: Send>(
    threads: usize,
    op: impl FnOnce() -> T + Send,
) -> Result<T, RunError> {
    if threads > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| RunError::ThreadPool(e.to_string()))?;
        Ok(pool.install(op))
    } else {
        Ok(op())
    }
}

/// Scan every instrument once.
///
/// Market data is fetched up front in one batch; a failed fetch leaves that
/// instrument on neutral market defaults.
pub fn scan(
    config: &RunConfig,
    source: &dyn CandleSource,
    provider: Option<&dyn MarketStructureProvider>,
    progress_cb: Option<ProgressCallback<'_>>,
) -> Result<SignalFeed, RunError> {
    config.validate()?;
    let run_id = config.run_id()?;
    let symbols = resolve_symbols(config, source)?;
    let instruments: Vec<Instrument> = symbols
        .iter()
        .map(|s| Instrument::new(s.as_str(), config.exchange.as_str()))
        .collect();

    info!(
        instruments = instruments.len(),
        strategies = config.strategies.len(),
        ltf = %config.ltf,
        htf = %config.htf,
        "starting scan"
    );

    let market: HashMap<String, MarketSeries> = match provider {
        Some(p) => p
            .fetch_batch(&instruments)
            .into_iter()
            .filter_map(|(symbol, result)| match result {
                Ok(series) => Some((symbol, series)),
                Err(e) => {
                    debug!(symbol = %symbol, provider = p.name(), error = %e, "no market data");
                    None
                }
            })
            .collect(),
        None => HashMap::new(),
    };

    let engine = config.engine_config();
    let evaluators: Vec<Box<dyn Evaluator>> = config
        .strategies
        .iter()
        .map(|&kind| create_evaluator(kind, &engine))
        .collect();
    let builder = ContextBuilder::new(&engine);
    let tracker = ProgressTracker::new(instruments.len());

    let results: Vec<Result<Vec<Signal>, ScanError>> = install(config.threads, || {
        instruments
            .par_iter()
            .map(|instrument| {
                let result = scan_instrument(
                    config,
                    source,
                    &builder,
                    &evaluators,
                    instrument,
                    market.get(&instrument.symbol),
                );
                let p = tracker.advance(&instrument.symbol);
                if let Some(cb) = progress_cb {
                    cb(&p);
                }
                std::thread::yield_now();
                result
            })
            .collect()
    })?;

    let mut signals = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(batch) => signals.extend(batch),
            Err(e) => errors.push(e),
        }
    }
    for signal in &mut signals {
        signal.sanitize();
    }
    signals.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.instrument.symbol.cmp(&b.instrument.symbol))
            .then_with(|| a.strategy.as_str().cmp(b.strategy.as_str()))
    });

    let feed = SignalFeed {
        generated_at: Utc::now(),
        run_id,
        ltf: config.ltf.clone(),
        htf: config.htf.clone(),
        signals,
        errors,
    };
    info!(
        signals = feed.signals.len(),
        actionable = feed.actionable().count(),
        errors = feed.errors.len(),
        "scan complete"
    );
    Ok(feed)
}

fn scan_instrument(
    config: &RunConfig,
    source: &dyn CandleSource,
    builder: &ContextBuilder<'_>,
    evaluators: &[Box<dyn Evaluator>],
    instrument: &Instrument,
    market: Option<&MarketSeries>,
) -> Result<Vec<Signal>, ScanError> {
    let fail = |e: &dyn std::fmt::Display| {
        warn!(symbol = %instrument.symbol, error = %e, "skipping instrument");
        ScanError {
            symbol: instrument.symbol.clone(),
            error: e.to_string(),
        }
    };
    let ltf = source.load(&instrument.symbol, &config.ltf).map_err(|e| fail(&e))?;
    let htf = source.load(&instrument.symbol, &config.htf).map_err(|e| fail(&e))?;

    let ctx = builder.build(instrument, &ltf, &htf, MarketInput::Prefetched(market));
    Ok(evaluators.iter().map(|e| e.evaluate(&ctx)).collect())
}
