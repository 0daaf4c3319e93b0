//! Per-instrument feature context.
//!
//! A [`Context`] is built once per (instrument, evaluation time), owned by the
//! evaluation call and never mutated afterwards. Every indicator any evaluator
//! needs is computed here exactly once.

pub mod features;
pub mod market;

pub use features::{Divergence, DivergenceMark, Features, SwingRange};
pub use market::MarketFeatures;

use crate::config::EngineConfig;
use crate::domain::{interval_ms, Candle, Instrument, SignalMeta};
use crate::indicators::{
    compute_checked, AccumulationDistribution, Adx, Atr, Ema, Indicator, IndicatorKey,
    IndicatorSet, Obv, Rsi, VolumeSma,
};
use crate::market::{MarketSeries, MarketStructureProvider};
use crate::trendline::{self, Trendlines};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContextStatus {
    Ready,
    InsufficientHistory {
        ltf: usize,
        htf: usize,
        required_ltf: usize,
        required_htf: usize,
    },
}

/// Where market-structure data comes from for one build.
#[derive(Clone, Copy)]
pub enum MarketInput<'a> {
    None,
    /// Batch mode: the caller fetched everything up front.
    Prefetched(Option<&'a MarketSeries>),
    /// Single mode: fetch this instrument through the provider.
    Provider(&'a dyn MarketStructureProvider),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub instrument: Instrument,
    pub status: ContextStatus,
    pub ltf: Vec<Candle>,
    pub htf: Vec<Candle>,
    pub indicators: IndicatorSet,
    pub htf_indicators: IndicatorSet,
    pub trendlines: Trendlines,
    pub features: Features,
    pub market: MarketFeatures,
    pub ltf_label: String,
    pub htf_label: String,
    /// Close time (epoch ms) of the last LTF candle; nothing later is visible.
    pub as_of: i64,
    /// Index of the last LTF candle in the caller's full series.
    pub candle_index: usize,
}

impl Context {
    pub fn is_ready(&self) -> bool {
        self.status == ContextStatus::Ready
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.ltf.last()
    }

    pub fn last_close(&self) -> f64 {
        self.ltf.last().map(|c| c.close).unwrap_or(0.0)
    }

    /// Window-relative index of the last LTF candle.
    pub fn last_index(&self) -> usize {
        self.ltf.len().saturating_sub(1)
    }

    pub fn atr(&self) -> Option<f64> {
        self.indicators.last(IndicatorKey::Atr)
    }

    pub fn rsi_series(&self) -> Option<&[f64]> {
        self.indicators.series(IndicatorKey::Rsi)
    }

    /// Volume of window candle `index` over the trailing average before it.
    pub fn volume_ratio_at(&self, index: usize) -> Option<f64> {
        features::volume_ratio_at(&self.ltf, &self.indicators, index)
    }

    pub fn meta(&self) -> SignalMeta {
        SignalMeta {
            ltf: self.ltf_label.clone(),
            htf: self.htf_label.clone(),
            calculated_at: self.ltf.last().map(|c| c.open_time).unwrap_or(0),
            candle_index: self.candle_index,
            phase: None,
        }
    }
}

/// Builds contexts from candle windows. Holds only the configuration.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Build from windows whose last LTF candle is the evaluation point.
    pub fn build(
        &self,
        instrument: &Instrument,
        ltf: &[Candle],
        htf: &[Candle],
        market: MarketInput<'_>,
    ) -> Context {
        self.build_at(instrument, ltf, htf, market, ltf.len().saturating_sub(1))
    }

    /// Same as [`build`](Self::build), recording `candle_index` as the position
    /// of the last LTF candle in the caller's full history.
    pub fn build_at(
        &self,
        instrument: &Instrument,
        ltf: &[Candle],
        htf: &[Candle],
        market: MarketInput<'_>,
        candle_index: usize,
    ) -> Context {
        let cfg = &self.config.context;
        let as_of = ltf
            .last()
            .map(|c| c.open_time + interval_ms(ltf).unwrap_or(0))
            .unwrap_or(0);

        let mut ctx = Context {
            instrument: instrument.clone(),
            status: ContextStatus::Ready,
            ltf: ltf.to_vec(),
            htf: htf.to_vec(),
            indicators: IndicatorSet::new(),
            htf_indicators: IndicatorSet::new(),
            trendlines: Trendlines::default(),
            features: Features::default(),
            market: MarketFeatures::unavailable(),
            ltf_label: cfg.ltf_label.clone(),
            htf_label: cfg.htf_label.clone(),
            as_of,
            candle_index,
        };

        if ltf.len() < cfg.min_ltf_candles || htf.len() < cfg.min_htf_candles {
            debug!(
                symbol = %instrument.symbol,
                ltf = ltf.len(),
                htf = htf.len(),
                "insufficient history"
            );
            ctx.status = ContextStatus::InsufficientHistory {
                ltf: ltf.len(),
                htf: htf.len(),
                required_ltf: cfg.min_ltf_candles,
                required_htf: cfg.min_htf_candles,
            };
            return ctx;
        }

        let ltf_set: [(IndicatorKey, Box<dyn Indicator>); 8] = [
            (IndicatorKey::Rsi, Box::new(Rsi::new(cfg.rsi_period))),
            (IndicatorKey::EmaFast, Box::new(Ema::new(cfg.ema_fast))),
            (IndicatorKey::EmaSlow, Box::new(Ema::new(cfg.ema_slow))),
            (IndicatorKey::Adx, Box::new(Adx::new(cfg.adx_period))),
            (IndicatorKey::Atr, Box::new(Atr::new(cfg.atr_period))),
            (IndicatorKey::Obv, Box::new(Obv)),
            (IndicatorKey::MoneyFlow, Box::new(AccumulationDistribution)),
            (IndicatorKey::VolumeSma, Box::new(VolumeSma::new(cfg.volume_avg_window))),
        ];
        ctx.indicators = compute_all(instrument, "ltf", &ltf_set, ltf);

        let htf_set: [(IndicatorKey, Box<dyn Indicator>); 5] = [
            (IndicatorKey::Rsi, Box::new(Rsi::new(cfg.rsi_period))),
            (IndicatorKey::EmaFast, Box::new(Ema::new(cfg.ema_fast))),
            (IndicatorKey::EmaSlow, Box::new(Ema::new(cfg.ema_slow))),
            (IndicatorKey::Adx, Box::new(Adx::new(cfg.adx_period))),
            (IndicatorKey::Atr, Box::new(Atr::new(cfg.atr_period))),
        ];
        ctx.htf_indicators = compute_all(instrument, "htf", &htf_set, htf);

        if let Some(rsi) = ctx.indicators.series(IndicatorKey::Rsi) {
            ctx.trendlines = trendline::detect(rsi, &self.config.trendline);
        }
        ctx.features = Features::compute(ltf, &ctx.indicators, cfg);

        ctx.market = match market {
            MarketInput::None | MarketInput::Prefetched(None) => MarketFeatures::unavailable(),
            MarketInput::Prefetched(Some(series)) => {
                MarketFeatures::from_series(series, as_of, cfg)
            }
            MarketInput::Provider(provider) => match provider.fetch(instrument) {
                Ok(series) => MarketFeatures::from_series(&series, as_of, cfg),
                Err(err) => {
                    debug!(symbol = %instrument.symbol, error = %err, "market data unavailable");
                    MarketFeatures::unavailable()
                }
            },
        };

        ctx
    }
}

fn compute_all(
    instrument: &Instrument,
    frame: &str,
    set: &[(IndicatorKey, Box<dyn Indicator>)],
    candles: &[Candle],
) -> IndicatorSet {
    let mut out = IndicatorSet::new();
    for (key, indicator) in set {
        match compute_checked(indicator.as_ref(), candles) {
            Ok(series) => out.insert(*key, series),
            Err(err) => warn!(
                symbol = %instrument.symbol,
                frame,
                indicator = %key,
                error = %err,
                "indicator omitted"
            ),
        }
    }
    out
}
